use log::warn;
use std::collections::HashMap;
use std::path::Path;

use crate::types::*;

/// Marker for fields holding data aligned to an experimental event
const ALIGN_MARKER: &str = "Align";
const AREA_FIELD: &str = "area";
const UNIT_LIST_FIELD: &str = "unitList";
const TIMESTAMPS_FIELD: &str = "TimeStamps";
const SAMPLES_FIELD: &str = "Samples";

/// Lookup table from file-type category to whether the file holds analog data.
///
/// The category is the file name up to its first `.`, e.g. `LFP` for
/// `LFP.mat` or `MUAe` for `MUAe.session1.mat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeTable {
    categories: HashMap<String, bool>,
}

impl Default for FileTypeTable {
    fn default() -> Self {
        Self::empty()
            .with_category("LFP", true)
            .with_category("LFPb", true)
            .with_category("MUAe", true)
            .with_category("NCS", true)
            .with_category("CSC", true)
            .with_category("hash", false)
            .with_category("unit", false)
            .with_category("microsaccades", false)
    }
}

impl FileTypeTable {
    /// A table without any categories.
    pub fn empty() -> Self {
        Self {
            categories: HashMap::new(),
        }
    }

    /// Adds or overrides a category.
    pub fn with_category(mut self, category: impl Into<String>, analog: bool) -> Self {
        self.categories.insert(category.into(), analog);
        self
    }

    /// Whether `category` holds analog data, or `None` for unknown categories.
    pub fn is_analog(&self, category: &str) -> Option<bool> {
        self.categories.get(category).copied()
    }
}

/// File-type category of `path`: its file name up to the first `.`.
pub fn file_category(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()?.split('.').next()
}

/// Reshapes a raw record into a flat recording.
///
/// Fields are visited in raw-record order, optionally restricted to
/// `requested`:
///
/// * `...Align` fields from analog files become [`Field::Signal`] holding the
///   first `TimeStamps` and `Samples` cells; from other files they are copied.
/// * `unitList` is shifted from 1-based to 0-based indices.
/// * Everything else is copied. Values that cannot be copied are logged,
///   left out, and listed in [`Recording::diagnostics`].
///
/// An `Align` field in a file whose category is not in `table` is an error,
/// as is a malformed aligned signal or a non-numeric `unitList`.
pub fn normalize_recording(
    raw: &Record,
    source: &Path,
    requested: Option<&[String]>,
    table: &FileTypeTable,
) -> Result<Recording, LoadError> {
    let category = file_category(source).unwrap_or_default();
    let mut recording = Recording::default();

    for (key, value) in raw.iter() {
        if let Some(requested) = requested {
            if !requested.iter().any(|name| name == key) {
                continue;
            }
        }

        match normalize_field(key, value, category, table)? {
            Ok(field) => recording.fields.push((key.clone(), field)),
            Err(error) => {
                warn!("Cannot process {}: {}", key, error);
                recording.diagnostics.push(FieldDiagnostic {
                    field: key.clone(),
                    error,
                });
            }
        }
    }

    Ok(recording)
}

/// The outer result is fatal for the whole recording, the inner one only for this field
fn normalize_field(
    key: &str,
    value: &Value,
    category: &str,
    table: &FileTypeTable,
) -> Result<Result<Field, FieldError>, LoadError> {
    if key.contains(ALIGN_MARKER) {
        let analog = table
            .is_analog(category)
            .ok_or_else(|| LoadError::UnknownFileType {
                category: category.to_string(),
            })?;

        return if analog {
            Ok(Ok(Field::Signal(extract_signal(key, value)?)))
        } else {
            Ok(Ok(Field::Value(value.clone())))
        };
    }

    match key {
        AREA_FIELD => Ok(Ok(Field::Value(value.clone()))),
        UNIT_LIST_FIELD => Ok(Ok(Field::Value(zero_based_units(value)?))),
        _ => Ok(copy_value(value).map(Field::Value)),
    }
}

fn extract_signal(key: &str, value: &Value) -> Result<AlignedSignal, LoadError> {
    Ok(AlignedSignal {
        timestamps: first_cell(key, value, TIMESTAMPS_FIELD)?,
        samples: first_cell(key, value, SAMPLES_FIELD)?,
    })
}

/// `value.<name>` of the first struct element
fn first_cell(key: &str, value: &Value, name: &str) -> Result<Value, LoadError> {
    let missing = || LoadError::MissingField {
        field: format!("{}.{}", key, name),
    };

    let Value::Struct(record) = value else {
        return Err(missing());
    };
    let cells = record.field(name).ok_or_else(missing)?;
    Value::Cell(cells).at(&[0, 0]).ok_or_else(missing)
}

fn zero_based_units(value: &Value) -> Result<Value, LoadError> {
    match value {
        Value::Numeric(units) => Ok(Value::Numeric(units.mapv(|unit| unit - 1.0))),
        other => Err(LoadError::InvalidField {
            field: UNIT_LIST_FIELD.to_string(),
            reason: format!("expected a numeric array, found {}", other.class_name()),
        }),
    }
}

fn copy_value(value: &Value) -> Result<Value, FieldError> {
    match value {
        Value::Unsupported(class) => Err(FieldError::Unsupported {
            class: class.clone(),
        }),
        other => Ok(other.clone()),
    }
}
