//! Execution results
//!
//! A run ends in exactly one [`ExecutionResult`]. Success carries a small,
//! JSON-ready value built from the final frame; failure carries one of three
//! kinds plus a message that is safe to feed back into a revision prompt.

use super::limits::ExecutionLimits;
use crate::dataset::schema::is_time_like;
use crate::dataset::ColumnKind;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The program asked for a capability it may not use. Nothing ran.
    PolicyViolation,
    /// A time, memory, step or result-size limit was hit.
    ResourceExceeded,
    /// The program ran and failed: missing column, type error, division by zero...
    RuntimeFault,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::PolicyViolation => write!(f, "PolicyViolation"),
            FailureKind::ResourceExceeded => write!(f, "ResourceExceeded"),
            FailureKind::RuntimeFault => write!(f, "RuntimeFault"),
        }
    }
}

/// Internal error type of the gate and the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FailureKind,
    pub message: String,
}

impl Fault {
    pub fn policy(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::PolicyViolation, message: message.into() }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::ResourceExceeded, message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::RuntimeFault, message: message.into() }
    }
}

impl From<PolarsError> for Fault {
    fn from(err: PolarsError) -> Self {
        Fault::runtime(err.to_string())
    }
}

impl From<Fault> for ExecutionResult {
    fn from(fault: Fault) -> Self {
        ExecutionResult::Failure { kind: fault.kind, message: fault.message }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, idx: usize) -> Vec<&serde_json::Value> {
        self.rows.iter().filter_map(|row| row.get(idx)).collect()
    }

    /// First temporal column, or first column named like a period.
    pub fn time_axis(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::Temporal || is_time_like(&c.name))
    }

    /// Numeric columns that carry measures rather than periods.
    pub fn measure_columns(&self) -> Vec<usize> {
        let axis = self.time_axis();
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, c)| Some(*idx) != axis && c.kind == ColumnKind::Numeric && !is_time_like(&c.name))
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ResultValue {
    Scalar { label: String, value: serde_json::Value },
    Sequence { label: String, values: Vec<serde_json::Value> },
    Table(ResultTable),
}

impl ResultValue {
    pub fn shape(&self) -> &'static str {
        match self {
            ResultValue::Scalar { .. } => "scalar",
            ResultValue::Sequence { .. } => "sequence",
            ResultValue::Table(_) => "table",
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            ResultValue::Scalar { .. } => 1,
            ResultValue::Sequence { values, .. } => values.len(),
            ResultValue::Table(t) => t.rows.len(),
        }
    }
}

/// What ran, step by step. Holds no timings so that repeated runs compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub entries: Vec<String>,
}

impl ExecutionLog {
    pub fn record(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success { value: ResultValue, log: ExecutionLog },
    Failure { kind: FailureKind, message: String },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionResult::Failure { kind, .. } => Some(*kind),
            ExecutionResult::Success { .. } => None,
        }
    }
}

/// Shape the final frame into a result value, enforcing the result-size limits.
pub fn frame_to_value(df: &DataFrame, limits: &ExecutionLimits) -> Result<ResultValue, Fault> {
    if df.width() == 0 || df.height() == 0 {
        return Err(Fault::runtime(
            "program produced no rows; check filter values against the sample values in the schema",
        ));
    }
    if df.height() > limits.max_result_rows {
        return Err(Fault::resource(format!(
            "Resource limit exceeded: result rows ({}) > max ({}); aggregate or limit the output",
            df.height(),
            limits.max_result_rows
        )));
    }
    let cells = df.height() * df.width();
    if cells > limits.max_result_cells {
        return Err(Fault::resource(format!(
            "Resource limit exceeded: result cells ({}) > max ({})",
            cells, limits.max_result_cells
        )));
    }

    let columns = df.get_columns();
    if df.width() == 1 {
        let series = &columns[0];
        let label = series.name().to_string();
        if df.height() == 1 {
            return Ok(ResultValue::Scalar { label, value: series_to_json_value(series, 0)? });
        }
        let values = (0..series.len())
            .map(|idx| series_to_json_value(series, idx))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ResultValue::Sequence { label, values });
    }

    let mut rows = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let row = columns
            .iter()
            .map(|series| series_to_json_value(series, row_idx))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok(ResultValue::Table(ResultTable {
        columns: columns
            .iter()
            .map(|s| ResultColumn {
                name: s.name().to_string(),
                kind: ColumnKind::from_dtype(s.dtype()),
            })
            .collect(),
        rows,
    }))
}

fn series_to_json_value(series: &Series, row_idx: usize) -> Result<serde_json::Value, Fault> {
    let any_val = series.get(row_idx)?;

    Ok(match any_val {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::Value::Bool(b),
        AnyValue::String(s) => serde_json::Value::String(s.to_string()),
        AnyValue::Int8(i) => serde_json::Value::Number(i.into()),
        AnyValue::Int16(i) => serde_json::Value::Number(i.into()),
        AnyValue::Int32(i) => serde_json::Value::Number(i.into()),
        AnyValue::Int64(i) => serde_json::Value::Number(i.into()),
        AnyValue::UInt8(u) => serde_json::Value::Number(u.into()),
        AnyValue::UInt16(u) => serde_json::Value::Number(u.into()),
        AnyValue::UInt32(u) => serde_json::Value::Number(u.into()),
        AnyValue::UInt64(u) => serde_json::Value::Number(u.into()),
        AnyValue::Float32(f) => float_value(f as f64),
        AnyValue::Float64(f) => float_value(f),
        other => serde_json::Value::String(other.to_string()),
    })
}

/// Floats are rounded to 6 decimals so that results do not differ in the
/// last bits between runs that sum in different orders.
fn float_value(f: f64) -> serde_json::Value {
    let rounded = (f * 1e6).round() / 1e6;
    serde_json::Number::from_f64(rounded)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sequence_table_shapes() {
        let limits = ExecutionLimits::default();

        let scalar = df!["total" => [12.5]].unwrap();
        assert_eq!(
            frame_to_value(&scalar, &limits).unwrap(),
            ResultValue::Scalar { label: "total".into(), value: serde_json::json!(12.5) }
        );

        let seq = df!["name" => ["a", "b"]].unwrap();
        assert_eq!(frame_to_value(&seq, &limits).unwrap().shape(), "sequence");

        let table = df!["name" => ["a", "b"], "v" => [1i64, 2]].unwrap();
        match frame_to_value(&table, &limits).unwrap() {
            ResultValue::Table(t) => {
                assert_eq!(t.columns[0].kind, ColumnKind::Text);
                assert_eq!(t.columns[1].kind, ColumnKind::Numeric);
                assert_eq!(t.rows[1], vec![serde_json::json!("b"), serde_json::json!(2)]);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_frame_is_runtime_fault() {
        let empty = df!["total" => Vec::<f64>::new()].unwrap();
        let fault = frame_to_value(&empty, &ExecutionLimits::default()).unwrap_err();
        assert_eq!(fault.kind, FailureKind::RuntimeFault);
    }

    #[test]
    fn test_row_limit_is_resource_exceeded() {
        let limits = ExecutionLimits { max_result_rows: 2, ..ExecutionLimits::default() };
        let df = df!["v" => [1i64, 2, 3]].unwrap();
        let fault = frame_to_value(&df, &limits).unwrap_err();
        assert_eq!(fault.kind, FailureKind::ResourceExceeded);
    }
}
