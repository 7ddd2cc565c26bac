use ndarray::{ArrayD, ShapeError};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A value read from a MATLAB file.
///
/// Mirrors the nested structure of the file exactly: numeric arrays keep
/// their MATLAB dimensions (at least two), cell arrays hold further values
/// and struct arrays hold one record per element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// Any numeric or logical array, widened to `f64`
    Numeric(ArrayD<f64>),
    /// A character array; multi-row arrays are joined with `'\n'`
    Char(String),
    /// A cell array
    Cell(ArrayD<Value>),
    /// A struct array
    Struct(StructArray),
    /// Content the reader recognised but could not decode (sparse, object, complex, ...)
    Unsupported(String),
}

impl Value {
    /// Returns the numeric array if this is a numeric value.
    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Value::Numeric(array) => Some(array),
            _ => None,
        }
    }

    /// Returns the text if this is a character array.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Char(text) => Some(text),
            _ => None,
        }
    }

    /// Shape of the underlying array. Characters report `[1, len]`,
    /// unsupported values report an empty shape.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Numeric(array) => array.shape().to_vec(),
            Value::Char(text) => vec![1, text.chars().count()],
            Value::Cell(cells) => cells.shape().to_vec(),
            Value::Struct(record) => record.elements.shape().to_vec(),
            Value::Unsupported(_) => Vec::new(),
        }
    }

    /// Indexes into the value, unwrapping one level of nesting.
    ///
    /// For a cell array this returns the contained value, for a numeric array
    /// a zero-dimensional array holding the element, and for a struct array a
    /// 1x1 struct holding the selected element.
    pub fn at(&self, index: &[usize]) -> Option<Value> {
        match self {
            Value::Numeric(array) => array
                .get(index)
                .map(|&x| Value::Numeric(ArrayD::from_elem(ndarray::IxDyn(&[]), x))),
            Value::Cell(cells) => cells.get(index).cloned(),
            Value::Struct(record) => record.element(index).map(|values| {
                Value::Struct(StructArray {
                    field_names: record.field_names.clone(),
                    elements: ArrayD::from_elem(ndarray::IxDyn(&[1, 1]), values.to_vec()),
                })
            }),
            Value::Char(_) | Value::Unsupported(_) => None,
        }
    }

    /// First element of a numeric array, if there is one.
    pub fn scalar(&self) -> Option<f64> {
        self.as_array().and_then(|array| array.iter().next().copied())
    }

    /// Name of the MATLAB class this value was read from.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Numeric(_) => "numeric",
            Value::Char(_) => "char",
            Value::Cell(_) => "cell",
            Value::Struct(_) => "struct",
            Value::Unsupported(class) => class,
        }
    }
}

/// A MATLAB struct array.
///
/// Every element holds one value per field, in the order of `field_names`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructArray {
    /// Field names in file order
    pub field_names: Vec<String>,
    /// One value list per struct element
    pub elements: ArrayD<Vec<Value>>,
}

impl StructArray {
    /// Position of a field, if present.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|field| field == name)
    }

    /// Projects one field across all elements, keeping the struct's shape.
    ///
    /// Returns `None` if the field is unknown or any element is too short to hold it.
    pub fn field(&self, name: &str) -> Option<ArrayD<Value>> {
        let index = self.field_index(name)?;
        let values = self
            .elements
            .iter()
            .map(|values| values.get(index).cloned())
            .collect::<Option<Vec<_>>>()?;
        ArrayD::from_shape_vec(self.elements.raw_dim(), values).ok()
    }

    /// Values of a single element, in field order.
    pub fn element(&self, index: &[usize]) -> Option<&[Value]> {
        self.elements.get(index).map(Vec::as_slice)
    }

    /// Number of struct elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Ordered mapping from variable name to value, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    entries: Vec<(String, Value)>,
    /// Position of each name in `entries`
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing an existing entry with the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let &position = self.index.get(name)?;
        self.entries.get(position).map(|(_, value)| value)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Continuous data time-locked to an event, unwrapped from its legacy struct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedSignal {
    /// Sample times
    pub timestamps: Value,
    /// Sample values
    pub samples: Value,
}

/// One entry of a normalized recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Field {
    /// Copied (or re-indexed) value
    Value(Value),
    /// Aligned analog signal extracted from a `...Align` struct
    Signal(AlignedSignal),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            Field::Signal(_) => None,
        }
    }

    pub fn as_signal(&self) -> Option<&AlignedSignal> {
        match self {
            Field::Signal(signal) => Some(signal),
            Field::Value(_) => None,
        }
    }
}

/// Why a single field was left out of a normalized recording.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum FieldError {
    #[error("values of class '{class}' cannot be copied")]
    Unsupported { class: String },
}

/// A field that was dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiagnostic {
    pub field: String,
    pub error: FieldError,
}

/// Result of normalizing a raw record.
///
/// Entries keep the order of the raw record. Fields that could not be
/// copied are listed in `diagnostics` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recording {
    pub fields: Vec<(String, Field)>,
    pub diagnostics: Vec<FieldDiagnostic>,
}

impl Recording {
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, field)| field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Errors raised while locating, reading or normalizing recordings.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A local file that is required does not exist
    #[error("File does not exist: {}", .0.display())]
    NotFound(PathBuf),
    /// The identifier is a URL; downloading is not available
    #[error("Loading file from URL not yet implemented: {url}")]
    RemoteUnsupported { url: String },
    /// The file is not a Level 5 MAT-file or is corrupt
    #[error("Unrecognized file format: {0}")]
    UnrecognizedFileFormat(String),
    /// An aligned field was found in a file whose type is not in the lookup table
    #[error("Unknown file type '{category}': cannot tell whether it holds analog data")]
    UnknownFileType { category: String },
    /// A required field is absent
    #[error("Missing field '{field}'")]
    MissingField { field: String },
    /// A field is present but has the wrong layout
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    /// A trial record has fewer positional fields than the trial schema
    #[error("Trial {trial} has {found} fields, expected {expected}")]
    MalformedTrial {
        trial: usize,
        found: usize,
        expected: usize,
    },
    /// Array dimensions do not match the element count
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
    /// An I/O error occurred during file reading
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the trajectory animation helpers.
///
/// All of them are detected before the drawing surface is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Trajectories with {0} dimensions are not supported (expected 2 or 3)")]
    UnsupportedDimension(usize),
    #[error("Frame {frame} is past the last sample ({samples} samples)")]
    FrameOutOfRange { frame: usize, samples: usize },
    #[error("Window of {window} samples reaches before the start of frame {frame}")]
    WindowExceedsFrame { frame: usize, window: usize },
    #[error("Expected {expected} handles, got {found}")]
    HandleCount { expected: usize, found: usize },
    #[error("No counter value for frame {frame} ({len} values)")]
    CounterOutOfRange { frame: usize, len: usize },
    #[error("Invalid counter template '{0}'")]
    Template(String),
}
