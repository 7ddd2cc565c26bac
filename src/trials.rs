use log::debug;
use ndarray::{Array1, Axis};
use serde::Serialize;
use std::path::Path;

use crate::source::RecordReader;
use crate::types::*;

const TRIALDATA_FIELD: &str = "trialdata";

/// Name of the derived attention-condition column
pub const ATTEND_COLUMN: &str = "attend";

/// How a positional trial field is turned into a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwrap {
    /// Keep the value as stored (event time series)
    Keep,
    /// Take the single element of a 1x1 array and truncate it to an integer
    Scalar,
}

/// One positional field of a legacy trial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialField {
    /// Name used by the legacy MATLAB code
    pub legacy_name: &'static str,
    /// Column name in the trial table
    pub column: &'static str,
    pub unwrap: Unwrap,
}

const fn field(legacy_name: &'static str, column: &'static str, unwrap: Unwrap) -> TrialField {
    TrialField {
        legacy_name,
        column,
        unwrap,
    }
}

/// Layout of a legacy trial record, in positional order.
pub const TRIAL_SCHEMA: [TrialField; 12] = [
    field("CTX_events", "CTX_events", Unwrap::Keep),
    field("NLX_events", "NLX_events", Unwrap::Keep),
    field("trialID", "trial_ID", Unwrap::Scalar),
    field("cond_num", "cond", Unwrap::Scalar),
    field("RT_evnt", "RT_evnt", Unwrap::Scalar),
    field("RT_EPP", "RT_EPP", Unwrap::Scalar),
    field("target_dim", "target_dim", Unwrap::Scalar),
    field("rf_dim", "rf_dim", Unwrap::Scalar),
    field("position_RF", "position_RF", Unwrap::Scalar),
    field("position_out1", "position_out1", Unwrap::Scalar),
    field("position_out2", "position_out2", Unwrap::Scalar),
    field("fixbreak", "fixbreak", Unwrap::Scalar),
];

/// Column the attention condition is derived from
const CONDITION_COLUMN: &str = "cond";

/// Attention condition of a trial.
///
/// Each condition code pairs an attended location with one of two
/// grating directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Attention {
    Unset = 0,
    /// Attend the receptive field
    Rf = 1,
    /// Attend away, first location
    Away1 = 2,
    /// Attend away, second location
    Away2 = 3,
}

impl Attention {
    pub fn from_condition(condition: i64) -> Self {
        match condition {
            1 | 4 => Attention::Rf,
            2 | 5 => Attention::Away1,
            3 | 6 => Attention::Away2,
            _ => Attention::Unset,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Data of one table column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColumnData {
    Int(Array1<i64>),
    Events(Vec<Value>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(values) => values.len(),
            ColumnData::Events(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// A single cell of a trial row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowCell<'a> {
    Int(i64),
    Events(&'a Value),
}

/// One row per trial.
///
/// Columns: `trial_ID, attend, cond, RT_evnt, RT_EPP, target_dim, rf_dim,
/// position_RF, position_out1, position_out2, fixbreak, CTX_events, NLX_events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialTable {
    columns: Vec<Column>,
    num_trials: usize,
}

impl TrialTable {
    /// Number of trials.
    pub fn len(&self) -> usize {
        self.num_trials
    }

    pub fn is_empty(&self) -> bool {
        self.num_trials == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn int_column(&self, name: &str) -> Option<&Array1<i64>> {
        match &self.column(name)?.data {
            ColumnData::Int(values) => Some(values),
            ColumnData::Events(_) => None,
        }
    }

    pub fn events(&self, name: &str) -> Option<&[Value]> {
        match &self.column(name)?.data {
            ColumnData::Events(values) => Some(values),
            ColumnData::Int(_) => None,
        }
    }

    /// The attention condition of every trial.
    pub fn attention(&self) -> Vec<Attention> {
        self.int_column(CONDITION_COLUMN)
            .map(|conditions| conditions.iter().map(|&c| Attention::from_condition(c)).collect())
            .unwrap_or_default()
    }

    /// Cells of trial `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<RowCell<'_>>> {
        if index >= self.num_trials {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|column| match &column.data {
                    ColumnData::Int(values) => RowCell::Int(values[index]),
                    ColumnData::Events(values) => RowCell::Events(&values[index]),
                })
                .collect(),
        )
    }
}

/// Reads a trial file and builds its trial table.
///
/// The file must exist; this is checked before anything is read.
pub fn load_trialdata_with<R: RecordReader + ?Sized>(
    path: &Path,
    reader: &R,
) -> Result<TrialTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let raw = reader.read(path, None)?;
    normalize_trial_table(&raw)
}

/// Builds a trial table from the `trialdata` field of a raw record.
///
/// `trialdata` is a 1xN struct array (or cell array of cell rows); each trial
/// holds the fields of [`TRIAL_SCHEMA`] by position. Every trial is validated
/// before the table is assembled.
pub fn normalize_trial_table(raw: &Record) -> Result<TrialTable, LoadError> {
    let trialdata = raw
        .get(TRIALDATA_FIELD)
        .ok_or_else(|| LoadError::MissingField {
            field: TRIALDATA_FIELD.to_string(),
        })?;

    let trials = trial_records(trialdata)?;
    for (trial, fields) in trials.iter().enumerate() {
        if fields.len() < TRIAL_SCHEMA.len() {
            return Err(LoadError::MalformedTrial {
                trial,
                found: fields.len(),
                expected: TRIAL_SCHEMA.len(),
            });
        }
    }

    let mut scalars = Vec::new();
    let mut events = Vec::new();
    for (position, layout) in TRIAL_SCHEMA.iter().enumerate() {
        match layout.unwrap {
            Unwrap::Keep => {
                let values = trials.iter().map(|fields| fields[position].clone()).collect();
                events.push(Column {
                    name: layout.column.to_string(),
                    data: ColumnData::Events(values),
                });
            }
            Unwrap::Scalar => {
                let values = trials
                    .iter()
                    .enumerate()
                    .map(|(trial, fields)| unwrap_scalar(trial, layout, fields[position]))
                    .collect::<Result<Vec<_>, _>>()?;
                scalars.push(Column {
                    name: layout.column.to_string(),
                    data: ColumnData::Int(Array1::from(values)),
                });
            }
        }
    }

    let attend = scalars
        .iter()
        .find(|column| column.name == CONDITION_COLUMN)
        .and_then(|column| match &column.data {
            ColumnData::Int(conditions) => {
                Some(conditions.mapv(|c| Attention::from_condition(c).code()))
            }
            ColumnData::Events(_) => None,
        })
        .unwrap_or_else(|| Array1::zeros(trials.len()));

    // Derived column sits right after the trial id
    let mut columns = scalars;
    columns.insert(
        1.min(columns.len()),
        Column {
            name: ATTEND_COLUMN.to_string(),
            data: ColumnData::Int(attend),
        },
    );
    columns.extend(events);

    debug!("Built trial table with {} trials", trials.len());

    Ok(TrialTable {
        columns,
        num_trials: trials.len(),
    })
}

/// Positional fields of every trial in the first row of `trialdata`
fn trial_records(trialdata: &Value) -> Result<Vec<Vec<&Value>>, LoadError> {
    let invalid = |reason: &str| LoadError::InvalidField {
        field: TRIALDATA_FIELD.to_string(),
        reason: reason.to_string(),
    };

    match trialdata {
        Value::Struct(records) => {
            if records.elements.ndim() == 0 || records.elements.len_of(Axis(0)) == 0 {
                return Ok(Vec::new());
            }
            Ok(records
                .elements
                .index_axis(Axis(0), 0)
                .into_iter()
                .map(|values| values.iter().collect())
                .collect())
        }
        Value::Cell(cells) => {
            if cells.ndim() == 0 || cells.len_of(Axis(0)) == 0 {
                return Ok(Vec::new());
            }
            cells
                .index_axis(Axis(0), 0)
                .into_iter()
                .map(|trial| {
                    positional_fields(trial)
                        .ok_or_else(|| invalid("trial is not a cell or struct"))
                })
                .collect()
        }
        _ => Err(invalid("expected a struct or cell array")),
    }
}

fn positional_fields(trial: &Value) -> Option<Vec<&Value>> {
    match trial {
        Value::Cell(fields) => Some(fields.iter().collect()),
        Value::Struct(record) => record.elements.iter().next().map(|values| values.iter().collect()),
        _ => None,
    }
}

/// Truncates the single element of a 1x1 numeric field toward zero.
///
/// NaN and infinite values have no integer representation and are rejected.
fn unwrap_scalar(trial: usize, layout: &TrialField, value: &Value) -> Result<i64, LoadError> {
    let invalid = |reason: String| LoadError::InvalidField {
        field: format!("{}[{}].{}", TRIALDATA_FIELD, trial, layout.legacy_name),
        reason,
    };

    let x = value
        .at(&[0, 0])
        .and_then(|element| element.scalar())
        .ok_or_else(|| {
            invalid(format!(
                "expected a 1x1 numeric value, found {} {:?}",
                value.class_name(),
                value.shape()
            ))
        })?;

    if !x.is_finite() {
        return Err(invalid(format!("{} cannot be stored as an integer", x)));
    }
    Ok(x.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};

    fn scalar(x: f64) -> Value {
        Value::Numeric(arr2(&[[x]]).into_dyn())
    }

    fn events(times: &[f64]) -> Value {
        Value::Numeric(ArrayD::from_shape_vec(IxDyn(&[times.len(), 1]), times.to_vec()).unwrap())
    }

    fn trial(id: i64, cond: i64, num_fields: usize) -> Vec<Value> {
        let mut fields = vec![events(&[0.1, 0.2]), events(&[1.5])];
        fields.push(scalar(id as f64));
        fields.push(scalar(cond as f64));
        for k in 4..12 {
            fields.push(scalar(k as f64 + 0.7));
        }
        fields.truncate(num_fields);
        fields
    }

    fn trialdata(trials: Vec<Vec<Value>>) -> Record {
        let names = TRIAL_SCHEMA.iter().map(|f| f.legacy_name.to_string()).collect();
        let n = trials.len();
        let value = Value::Struct(StructArray {
            field_names: names,
            elements: ArrayD::from_shape_vec(IxDyn(&[1, n]), trials).unwrap(),
        });
        [(TRIALDATA_FIELD, value)].into_iter().collect()
    }

    #[test]
    fn attention_follows_condition_codes() {
        let raw = trialdata((1..=7).map(|cond| trial(100 + cond, cond, 12)).collect());
        let table = normalize_trial_table(&raw).unwrap();

        assert_eq!(table.len(), 7);
        assert_eq!(
            table.int_column(ATTEND_COLUMN).unwrap().to_vec(),
            vec![1, 2, 3, 1, 2, 3, 0]
        );
        assert_eq!(
            table.attention(),
            vec![
                Attention::Rf,
                Attention::Away1,
                Attention::Away2,
                Attention::Rf,
                Attention::Away1,
                Attention::Away2,
                Attention::Unset
            ]
        );
    }

    #[test]
    fn columns_are_in_table_order() {
        let table = normalize_trial_table(&trialdata(vec![trial(1, 1, 12)])).unwrap();
        assert_eq!(
            table.column_names(),
            vec![
                "trial_ID",
                "attend",
                "cond",
                "RT_evnt",
                "RT_EPP",
                "target_dim",
                "rf_dim",
                "position_RF",
                "position_out1",
                "position_out2",
                "fixbreak",
                "CTX_events",
                "NLX_events"
            ]
        );
    }

    #[test]
    fn scalars_are_truncated_and_events_kept() {
        let table = normalize_trial_table(&trialdata(vec![trial(7, 2, 12)])).unwrap();

        assert_eq!(table.int_column("trial_ID").unwrap()[0], 7);
        assert_eq!(table.int_column("RT_evnt").unwrap()[0], 4);
        assert_eq!(table.int_column("fixbreak").unwrap()[0], 11);
        assert_eq!(table.events("CTX_events").unwrap()[0], events(&[0.1, 0.2]));
        assert_eq!(table.events("NLX_events").unwrap()[0], events(&[1.5]));

        let row = table.row(0).unwrap();
        assert_eq!(row[0], RowCell::Int(7));
        assert_eq!(row[1], RowCell::Int(2));
        assert!(table.row(1).is_none());
    }

    #[test]
    fn short_trial_is_rejected_before_any_row() {
        let raw = trialdata(vec![trial(1, 1, 12), trial(2, 2, 11)]);
        let err = normalize_trial_table(&raw).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MalformedTrial {
                trial: 1,
                found: 11,
                expected: 12
            }
        ));
    }

    #[test]
    fn cell_rows_are_accepted() {
        let rows: Vec<Value> = (1..=3)
            .map(|cond| {
                let fields = trial(cond, cond, 12);
                Value::Cell(ArrayD::from_shape_vec(IxDyn(&[1, 12]), fields).unwrap())
            })
            .collect();
        let raw: Record = [(
            TRIALDATA_FIELD,
            Value::Cell(ArrayD::from_shape_vec(IxDyn(&[1, 3]), rows).unwrap()),
        )]
        .into_iter()
        .collect();

        let table = normalize_trial_table(&raw).unwrap();
        assert_eq!(table.int_column(ATTEND_COLUMN).unwrap().to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_trialdata_is_reported() {
        let err = normalize_trial_table(&Record::new()).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { .. }));
    }

    #[test]
    fn non_numeric_scalar_field_is_invalid() {
        let mut fields = trial(1, 1, 12);
        fields[3] = Value::Char("one".into());
        let err = normalize_trial_table(&trialdata(vec![fields])).unwrap_err();
        assert!(matches!(err, LoadError::InvalidField { ref field, .. } if field == "trialdata[0].cond_num"));
    }

    #[test]
    fn negative_scalars_truncate_toward_zero() {
        let mut fields = trial(1, 1, 12);
        fields[4] = scalar(-2.7);
        fields[5] = scalar(-0.4);
        let table = normalize_trial_table(&trialdata(vec![fields])).unwrap();

        assert_eq!(table.int_column("RT_evnt").unwrap()[0], -2);
        assert_eq!(table.int_column("RT_EPP").unwrap()[0], 0);
    }

    #[test]
    fn non_finite_scalars_are_invalid() {
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut fields = trial(1, 1, 12);
            fields[4] = scalar(x);
            let err = normalize_trial_table(&trialdata(vec![fields])).unwrap_err();
            assert!(
                matches!(err, LoadError::InvalidField { ref field, .. } if field == "trialdata[0].RT_evnt"),
                "{} should be rejected",
                x
            );
        }
    }

    #[test]
    fn empty_scalar_field_is_invalid() {
        let mut fields = trial(3, 2, 12);
        fields[6] = Value::Numeric(ArrayD::zeros(IxDyn(&[0, 0])));
        let err = normalize_trial_table(&trialdata(vec![trial(1, 1, 12), fields])).unwrap_err();
        assert!(matches!(err, LoadError::InvalidField { ref field, .. } if field == "trialdata[1].target_dim"));
    }

    #[test]
    fn missing_file_is_checked_first() {
        struct Unreachable;
        impl RecordReader for Unreachable {
            fn read(&self, _: &Path, _: Option<&[String]>) -> Result<Record, LoadError> {
                panic!("reader must not be called for a missing file")
            }
        }

        let err = load_trialdata_with(Path::new("no/such/trialdata.mat"), &Unreachable).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }
}
