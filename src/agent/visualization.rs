//! Chart hints derived from the result shape.
//!
//! A table with a time axis and numeric columns becomes a line chart; a
//! table with a category column and numeric columns becomes a bar chart.
//! Scalars and sequences get no chart.

use super::contracts::{ChartSeries, ChartType, VisualizationSpec};
use crate::dataset::ColumnKind;
use crate::sandbox::{ResultTable, ResultValue};
use crate::synthesis::narrative::format_label;

pub fn derive_visualizations(value: &ResultValue, title: &str) -> Vec<VisualizationSpec> {
    match value {
        ResultValue::Table(table) => chart_for_table(table, title).into_iter().collect(),
        ResultValue::Scalar { .. } | ResultValue::Sequence { .. } => Vec::new(),
    }
}

fn chart_for_table(table: &ResultTable, title: &str) -> Option<VisualizationSpec> {
    let (axis, chart_type) = match table.time_axis() {
        Some(idx) => (idx, ChartType::Line),
        None => (
            table.columns.iter().position(|c| c.kind == ColumnKind::Text)?,
            ChartType::Bar,
        ),
    };

    let datasets: Vec<ChartSeries> = table
        .measure_columns()
        .into_iter()
        .map(|idx| ChartSeries {
            label: table.columns[idx].name.clone(),
            data: table.rows.iter().map(|row| row.get(idx).and_then(|v| v.as_f64())).collect(),
        })
        .collect();
    if datasets.is_empty() {
        return None;
    }

    Some(VisualizationSpec {
        chart_type,
        title: title.to_string(),
        labels: table
            .rows
            .iter()
            .map(|row| row.get(axis).map(format_label).unwrap_or_default())
            .collect(),
        datasets,
    })
}
