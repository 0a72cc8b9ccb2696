//! Schema description handed to the program synthesizer.
//!
//! Computed once per snapshot version: column names, dtypes, distinct counts
//! and a few sample values per column, plus row count and the covered time
//! range when the table has one.

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SAMPLE_VALUES: usize = 5;
/// Time-like columns list all their distinct values, up to this many.
const TIME_SAMPLE_VALUES: usize = 24;

/// Column names treated as time axes when their dtype is not temporal.
const TIME_COLUMN_NAMES: &[&str] = &["year", "quarter", "month", "week", "day", "date", "period"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
    Temporal,
    Boolean,
}

impl ColumnKind {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Boolean => ColumnKind::Boolean,
            DataType::Date | DataType::Datetime(_, _) | DataType::Time | DataType::Duration(_) => {
                ColumnKind::Temporal
            }
            dt if dt.is_numeric() => ColumnKind::Numeric,
            _ => ColumnKind::Text,
        }
    }
}

/// True when a column name denotes a time axis ("Year", "order_month", ...).
pub fn is_time_like(name: &str) -> bool {
    let lowered = name.to_lowercase();
    TIME_COLUMN_NAMES
        .iter()
        .any(|t| lowered == *t || lowered.ends_with(&format!("_{}", t)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
    pub distinct_count: usize,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnSchema>,
    pub time_range: Option<(String, String)>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn describe<'a>(tables: impl IntoIterator<Item = (&'a str, &'a DataFrame)>) -> Result<Self> {
        let tables = tables
            .into_iter()
            .map(|(name, df)| describe_table(name, df))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Text block for prompts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("Table `{}` ({} rows)\n", table.name, table.row_count));
            if let Some((from, to)) = &table.time_range {
                out.push_str(&format!("Time range: {} to {}\n", from, to));
            }
            out.push_str("Columns:\n");
            for column in &table.columns {
                out.push_str(&format!(
                    "- {} ({}, {} distinct): {}\n",
                    column.name,
                    column.dtype,
                    column.distinct_count,
                    column.samples.join(", ")
                ));
            }
            out.push('\n');
        }
        out
    }
}

fn describe_table(name: &str, df: &DataFrame) -> Result<TableSchema> {
    let mut columns = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        let time_like = is_time_like(series.name());
        let limit = if time_like { TIME_SAMPLE_VALUES } else { SAMPLE_VALUES };
        let mut samples = distinct_samples(series, limit)?;
        if time_like {
            sort_mixed(&mut samples);
        }
        columns.push(ColumnSchema {
            name: series.name().to_string(),
            dtype: series.dtype().to_string(),
            kind: ColumnKind::from_dtype(series.dtype()),
            distinct_count: series.n_unique()?,
            samples,
        });
    }

    Ok(TableSchema {
        name: name.to_string(),
        row_count: df.height(),
        time_range: time_range(df, &columns)?,
        columns,
    })
}

/// First `limit` distinct non-null values in row order.
fn distinct_samples(series: &Series, limit: usize) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for idx in 0..series.len() {
        if samples.len() >= limit {
            break;
        }
        let value = series.get(idx)?;
        if matches!(value, AnyValue::Null) {
            continue;
        }
        let rendered = any_value_to_string(&value);
        if seen.insert(rendered.clone()) {
            samples.push(rendered);
        }
    }
    Ok(samples)
}

fn sort_mixed(values: &mut [String]) {
    values.sort_by(|a, b| match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    });
}

fn time_range(df: &DataFrame, columns: &[ColumnSchema]) -> Result<Option<(String, String)>> {
    let axis = columns
        .iter()
        .find(|c| c.kind == ColumnKind::Temporal)
        .or_else(|| {
            columns
                .iter()
                .find(|c| c.kind == ColumnKind::Numeric && c.name.eq_ignore_ascii_case("year"))
        });
    let Some(axis) = axis else {
        return Ok(None);
    };

    let bounds = df
        .clone()
        .lazy()
        .select([
            col(&axis.name).min().alias("min"),
            col(&axis.name).max().alias("max"),
        ])
        .collect()?;
    let min = bounds.column("min")?.get(0)?;
    let max = bounds.column("max")?.get(0)?;
    if matches!(min, AnyValue::Null) || matches!(max, AnyValue::Null) {
        return Ok(None);
    }
    Ok(Some((any_value_to_string(&min), any_value_to_string(&max))))
}

pub(crate) fn any_value_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::String(s) => s.to_string(),
        AnyValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> DataFrame {
        df![
            "Year" => [2024i64, 2023, 2024, 2023],
            "Division_Name" => ["Cement", "Steel", "Cement", "Paint"],
            "Net_Amount_BDT" => [100.0, 50.0, 25.0, 10.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_describe_table() {
        let df = sales();
        let schema = SchemaDescription::describe([("sales", &df)]).unwrap();
        let table = schema.table("sales").unwrap();

        assert_eq!(table.row_count, 4);
        assert_eq!(table.time_range, Some(("2023".to_string(), "2024".to_string())));

        let year = table.column("Year").unwrap();
        assert_eq!(year.kind, ColumnKind::Numeric);
        assert_eq!(year.samples, vec!["2023", "2024"]);

        let division = table.column("Division_Name").unwrap();
        assert_eq!(division.kind, ColumnKind::Text);
        assert_eq!(division.distinct_count, 3);
        assert_eq!(division.samples, vec!["Cement", "Steel", "Paint"]);
    }

    #[test]
    fn test_render_mentions_columns() {
        let df = sales();
        let rendered = SchemaDescription::describe([("sales", &df)]).unwrap().render();
        assert!(rendered.contains("Table `sales` (4 rows)"));
        assert!(rendered.contains("- Net_Amount_BDT"));
    }

    #[test]
    fn test_time_like_names() {
        assert!(is_time_like("Year"));
        assert!(is_time_like("order_month"));
        assert!(!is_time_like("Yearly_Target"));
        assert!(!is_time_like("Branch_Name"));
    }
}
