//! Per-intent strategies plugged into the shared agent loop.

use super::contracts::AgentKind;
use crate::dataset::ColumnKind;
use crate::intent::Intent;
use crate::sandbox::trend::{future_labels, FutureLabels, LinearTrend};
use crate::sandbox::{ResultColumn, ResultTable, ResultValue};
use crate::synthesis::narrative::format_label;
use serde_json::Value;

/// Periods appended when a predictive result arrives without a forecast.
pub const REFINE_HORIZON: usize = 3;

pub use crate::sandbox::trend::FORECAST_COLUMN;

pub trait AgentStrategy: Send + Sync {
    fn intent(&self) -> Intent;

    fn kind(&self) -> AgentKind {
        AgentKind::for_intent(self.intent())
    }

    /// Instructions added to the synthesis prompt.
    fn guidance(&self) -> &'static str;

    /// Instructions added to the narrative prompt.
    fn narrative_style(&self) -> &'static str;

    /// Knowledge kinds searched for grounding context, most important first.
    fn context_kinds(&self) -> &'static [&'static str] {
        &["schema", "products"]
    }

    /// Post-process a successful result before it is explained.
    fn refine(&self, value: ResultValue) -> ResultValue {
        value
    }
}

pub struct DescriptiveStrategy;

impl AgentStrategy for DescriptiveStrategy {
    fn intent(&self) -> Intent {
        Intent::Descriptive
    }

    fn guidance(&self) -> &'static str {
        "Answer the question directly. Filter to the requested period or segment and aggregate the measure asked for. A single total should end in an aggregate step; a breakdown should group, sort and limit."
    }

    fn narrative_style(&self) -> &'static str {
        "State the figure plainly with its unit and period."
    }
}

pub struct DiagnosticStrategy;

impl AgentStrategy for DiagnosticStrategy {
    fn intent(&self) -> Intent {
        Intent::Diagnostic
    }

    fn guidance(&self) -> &'static str {
        "Explain what drives the metric. Group it by candidate drivers such as division, product or branch, use share to show each driver's contribution, and compare periods with pct_change after sorting by the time column."
    }

    fn narrative_style(&self) -> &'static str {
        "Name the largest contributors and the size of the change, then suggest the most likely cause shown by the numbers."
    }

    fn context_kinds(&self) -> &'static [&'static str] {
        &["schema", "products", "business_events", "relationships"]
    }
}

pub struct PredictiveStrategy;

impl AgentStrategy for PredictiveStrategy {
    fn intent(&self) -> Intent {
        Intent::Predictive
    }

    fn guidance(&self) -> &'static str {
        "Project the metric forward. Group it by a time column (Year, Month or a date), sort ascending by that column, then use forecast with a small horizon. Use pct_change to describe the recent trend when useful."
    }

    fn narrative_style(&self) -> &'static str {
        "Give the projected values and the direction of the trend, and note that the projection assumes the recent trend continues."
    }

    fn context_kinds(&self) -> &'static [&'static str] {
        &["schema", "products", "seasonal_patterns", "business_events"]
    }

    fn refine(&self, value: ResultValue) -> ResultValue {
        match value {
            ResultValue::Table(table) => match append_forecast(&table, REFINE_HORIZON) {
                Some(extended) => ResultValue::Table(extended),
                None => ResultValue::Table(table),
            },
            other => other,
        }
    }
}

pub struct PrescriptiveStrategy;

impl AgentStrategy for PrescriptiveStrategy {
    fn intent(&self) -> Intent {
        Intent::Prescriptive
    }

    fn guidance(&self) -> &'static str {
        "Compare the options the question is about. Group by the option column, compute the deciding measure (for example profit or margin with derive), sort descending and limit to the best candidates."
    }

    fn narrative_style(&self) -> &'static str {
        "Recommend the best option first, back it with its figure, and mention the runner-up."
    }

    fn context_kinds(&self) -> &'static [&'static str] {
        &["schema", "products", "business_events", "relationships"]
    }
}

/// Extend a time-indexed table with linear-trend rows for its last numeric
/// column. `None` when the table already has a forecast, has no time axis,
/// or has too few observations.
pub fn append_forecast(table: &ResultTable, horizon: usize) -> Option<ResultTable> {
    if table.column_index(FORECAST_COLUMN).is_some() || horizon == 0 {
        return None;
    }
    let axis = table.time_axis()?;
    let measure = table.measure_columns().last().copied()?;

    let observed: Option<Vec<f64>> = table
        .column_values(measure)
        .into_iter()
        .map(Value::as_f64)
        .collect();
    let trend = LinearTrend::fit(&observed?)?;

    let labels: Vec<String> = table
        .column_values(axis)
        .into_iter()
        .map(format_label)
        .collect();
    let future: Vec<Value> = match future_labels(&labels, horizon) {
        FutureLabels::Integer(values) => values.into_iter().map(Value::from).collect(),
        FutureLabels::Text(values) => values.into_iter().map(Value::from).collect(),
    };

    let width = table.columns.len();
    let mut columns = table.columns.clone();
    columns.push(ResultColumn { name: FORECAST_COLUMN.to_string(), kind: ColumnKind::Numeric });

    let mut rows: Vec<Vec<Value>> = table
        .rows
        .iter()
        .map(|row| {
            let mut extended = row.clone();
            extended.push(Value::Null);
            extended
        })
        .collect();
    for (label, projected) in future.into_iter().zip(trend.extrapolate(horizon)) {
        let mut row = vec![Value::Null; width + 1];
        row[axis] = label;
        row[width] = Value::from((projected * 1e6).round() / 1e6);
        rows.push(row);
    }

    Some(ResultTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn yearly() -> ResultTable {
        ResultTable {
            columns: vec![
                ResultColumn { name: "Year".into(), kind: ColumnKind::Numeric },
                ResultColumn { name: "sales".into(), kind: ColumnKind::Numeric },
            ],
            rows: vec![
                vec![json!(2022), json!(100.0)],
                vec![json!(2023), json!(110.0)],
                vec![json!(2024), json!(120.0)],
            ],
        }
    }

    #[test]
    fn test_append_forecast_continues_years() {
        let extended = append_forecast(&yearly(), 2).unwrap();
        assert_eq!(extended.columns.len(), 3);
        assert_eq!(extended.rows.len(), 5);
        assert_eq!(extended.rows[3], vec![json!(2025), Value::Null, json!(130.0)]);
        assert_eq!(extended.rows[4], vec![json!(2026), Value::Null, json!(140.0)]);
        assert_eq!(extended.rows[0][2], Value::Null);
    }

    #[test]
    fn test_existing_forecast_is_left_alone() {
        let mut table = yearly();
        table.columns[1].name = FORECAST_COLUMN.into();
        let refined = PredictiveStrategy.refine(ResultValue::Table(table.clone()));
        assert_eq!(refined, ResultValue::Table(table));
    }

    #[test]
    fn test_non_temporal_table_is_left_alone() {
        let table = ResultTable {
            columns: vec![
                ResultColumn { name: "Branch_Name".into(), kind: ColumnKind::Text },
                ResultColumn { name: "profit".into(), kind: ColumnKind::Numeric },
            ],
            rows: vec![vec![json!("A"), json!(1.0)], vec![json!("B"), json!(2.0)]],
        };
        assert!(append_forecast(&table, 3).is_none());
    }

    #[test]
    fn test_other_strategies_do_not_refine() {
        let value = ResultValue::Table(yearly());
        assert_eq!(DescriptiveStrategy.refine(value.clone()), value);
        assert_eq!(PrescriptiveStrategy.kind(), AgentKind::Strategist);
    }

    #[test]
    fn test_every_strategy_asks_for_schema_first() {
        let strategies: [&dyn AgentStrategy; 4] =
            [&DescriptiveStrategy, &DiagnosticStrategy, &PredictiveStrategy, &PrescriptiveStrategy];
        for strategy in strategies {
            assert_eq!(strategy.context_kinds()[..2], ["schema", "products"]);
        }
        assert!(PredictiveStrategy.context_kinds().contains(&"seasonal_patterns"));
    }
}
