//! Rendering result values into text for narratives and prompts.

use crate::dataset::ColumnKind;
use crate::sandbox::trend::FORECAST_COLUMN;
use crate::sandbox::{ResultTable, ResultValue};
use itertools::Itertools;

pub const RESULT_PLACEHOLDER: &str = "{result}";

const PROMPT_ROWS: usize = 20;
const COMPACT_ROWS: usize = 5;

/// `1234567.891` -> `1,234,567.89`; integers keep no decimals.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = (value * 100.0).round() / 100.0;
    let negative = rounded < 0.0;
    let abs = rounded.abs();
    let whole = abs.trunc() as u64;
    let cents = ((abs - abs.trunc()) * 100.0).round() as u64;

    let digits = whole.to_string();
    let grouped = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .join(",");

    let sign = if negative && (whole > 0 || cents > 0) { "-" } else { "" };
    if cents == 0 {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{:02}", sign, grouped, cents)
    }
}

pub fn format_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "n/a".to_string(),
        other => other.to_string(),
    }
}

/// Row label text: years and other integral periods render without digit
/// grouping, nulls render empty.
pub fn format_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Short inline rendering used to fill `{result}`.
pub fn compact(value: &ResultValue) -> String {
    match value {
        ResultValue::Scalar { value, .. } => format_json(value),
        ResultValue::Sequence { values, .. } => {
            let shown = values.iter().take(COMPACT_ROWS).map(format_json).join(", ");
            if values.len() > COMPACT_ROWS {
                format!("{} and {} more", shown, values.len() - COMPACT_ROWS)
            } else {
                shown
            }
        }
        ResultValue::Table(table) => {
            let shown = table.rows.iter().take(COMPACT_ROWS).map(|row| compact_row(table, row)).join("; ");
            if table.rows.len() > COMPACT_ROWS {
                format!("{} (and {} more)", shown, table.rows.len() - COMPACT_ROWS)
            } else {
                shown
            }
        }
    }
}

/// `label: value` for one row. The label joins the first text column and the
/// time axis. The value is the last non-null measure, so forecast tables show
/// observed figures and then projected ones.
fn compact_row(table: &ResultTable, row: &[serde_json::Value]) -> String {
    let axis = table.time_axis();
    let category = table
        .columns
        .iter()
        .enumerate()
        .position(|(idx, c)| Some(idx) != axis && c.kind != ColumnKind::Numeric);
    let label_columns: Vec<usize> = category.into_iter().chain(axis).sorted().collect();
    let measures = table.measure_columns();
    let chosen = measures
        .iter()
        .rev()
        .find(|idx| row.get(**idx).map_or(false, |v| !v.is_null()))
        .or(measures.last())
        .copied();

    let value = match chosen {
        Some(idx) => {
            let text = row.get(idx).map(format_json).unwrap_or_default();
            if table.columns[idx].name == FORECAST_COLUMN && measures.len() > 1 {
                format!("{} (forecast)", text)
            } else {
                text
            }
        }
        None => row
            .iter()
            .enumerate()
            .filter(|(idx, _)| !label_columns.contains(idx))
            .map(|(_, v)| format_json(v))
            .join(", "),
    };
    let label = label_columns
        .iter()
        .filter_map(|idx| row.get(*idx))
        .map(format_label)
        .filter(|text| !text.is_empty())
        .join(" ");
    if label.is_empty() {
        value
    } else {
        format!("{}: {}", label, value)
    }
}

/// Plain-text rendering used inside prompts.
pub fn render_for_prompt(value: &ResultValue) -> String {
    match value {
        ResultValue::Scalar { label, value } => format!("{} = {}", label, format_json(value)),
        ResultValue::Sequence { label, values } => format!(
            "{}: {}",
            label,
            values.iter().take(PROMPT_ROWS).map(format_json).join(", ")
        ),
        ResultValue::Table(table) => {
            let mut lines = vec![table.columns.iter().map(|c| c.name.as_str()).join(" | ")];
            for row in table.rows.iter().take(PROMPT_ROWS) {
                lines.push(row.iter().map(format_json).join(" | "));
            }
            if table.rows.len() > PROMPT_ROWS {
                lines.push(format!("... {} more rows", table.rows.len() - PROMPT_ROWS));
            }
            lines.join("\n")
        }
    }
}

/// Substitute the formatted result into a template. Returns `None` when
/// the template has no placeholder for it.
pub fn fill_template(template: &str, value: &ResultValue) -> Option<String> {
    if template.contains(RESULT_PLACEHOLDER) {
        Some(template.replace(RESULT_PLACEHOLDER, &compact(value)))
    } else {
        None
    }
}

/// Used when no model-written narrative is available.
pub fn fallback_summary(value: &ResultValue) -> String {
    match value {
        ResultValue::Scalar { label, value } => {
            format!("{}: {}.", humanize(label), format_json(value))
        }
        ResultValue::Sequence { label, values } => {
            format!("{} ({} values): {}.", humanize(label), values.len(), compact(value))
        }
        ResultValue::Table(table) => format!(
            "The analysis returned {} row(s). {}.",
            table.rows.len(),
            compact(value)
        ),
    }
}

fn humanize(label: &str) -> String {
    let spaced = label.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
