//! Step interpreter
//!
//! Executes a gated [`Program`] against one table of the snapshot. The table
//! is cloned (a cheap `Arc` copy of its columns) and every step returns a new
//! frame, so the snapshot itself is never written to. The only surface a
//! program reaches is the match in [`apply`].

use super::limits::Budget;
use super::program::{AggFunc, Aggregation, Arithmetic, Comparison, Operand, Program, Step};
use super::result::{ExecutionLog, Fault};
use super::trend::{future_labels, FutureLabels, LinearTrend, FORECAST_COLUMN};
use crate::dataset::schema::any_value_to_string;
use crate::dataset::DatasetSnapshot;
use polars::prelude::*;

/// Row loops check the budget this often.
const CHECK_EVERY: usize = 4096;
const MAX_FORECAST_HORIZON: usize = 36;

pub fn run(
    program: &Program,
    snapshot: &DatasetSnapshot,
    budget: &mut Budget<'_>,
    log: &mut ExecutionLog,
) -> Result<DataFrame, Fault> {
    let source = snapshot.table(&program.table).ok_or_else(|| {
        Fault::runtime(format!(
            "unknown table '{}'; available tables: {}",
            program.table,
            snapshot.table_names().collect::<Vec<_>>().join(", ")
        ))
    })?;

    let mut df = source.as_ref().clone();
    log.record(format!("load {} ({} rows)", program.table, df.height()));

    for step in &program.steps {
        budget.begin_step()?;
        df = apply(step, df, budget)?;
        budget.observe(&df)?;
        log.record(format!("{} -> {} rows", describe(step), df.height()));
    }
    budget.checkpoint()?;
    Ok(df)
}

fn apply(step: &Step, df: DataFrame, budget: &Budget<'_>) -> Result<DataFrame, Fault> {
    match step {
        Step::Filter { column, cmp, value } => filter(df, column, *cmp, value, budget),
        Step::Select { columns } => {
            let exprs = column_exprs(&df, columns)?;
            Ok(df.lazy().select(exprs).collect()?)
        }
        Step::Group { by, aggregations } => {
            if by.is_empty() {
                return Err(Fault::runtime("group needs at least one column in \"by\""));
            }
            let keys = column_exprs(&df, by)?;
            let aggs = aggregation_exprs(&df, aggregations)?;
            Ok(df.lazy().group_by_stable(keys).agg(aggs).collect()?)
        }
        Step::Aggregate { aggregations } => {
            let aggs = aggregation_exprs(&df, aggregations)?;
            Ok(df.lazy().select(aggs).collect()?)
        }
        Step::Sort { by, descending } => {
            if by.is_empty() {
                return Err(Fault::runtime("sort needs at least one column in \"by\""));
            }
            let keys = column_exprs(&df, by)?;
            let options = SortMultipleOptions::default()
                .with_order_descendings(vec![*descending; by.len()])
                .with_maintain_order(true);
            Ok(df.lazy().sort_by_exprs(keys, options).collect()?)
        }
        Step::Limit { n } => Ok(df.head(Some(*n))),
        Step::Derive { name, left, arith, right } => derive(df, name, left, *arith, right, budget),
        Step::PctChange { column, alias } => {
            let name = alias.clone().unwrap_or_else(|| format!("{}_pct_change", column));
            pct_change(df, column, &name, budget)
        }
        Step::Share { column, alias } => {
            let name = alias.clone().unwrap_or_else(|| format!("{}_share", column));
            share(df, column, &name)
        }
        Step::Forecast { time_column, value_column, horizon } => {
            forecast(&df, time_column, value_column, *horizon)
        }
    }
}

fn describe(step: &Step) -> String {
    match step {
        Step::Filter { column, cmp, value } => format!("filter {} {:?} {}", column, cmp, value),
        Step::Select { columns } => format!("select {}", columns.join(", ")),
        Step::Group { by, aggregations } => format!(
            "group by {} [{}]",
            by.join(", "),
            aggregations.iter().map(|a| a.output_name()).collect::<Vec<_>>().join(", ")
        ),
        Step::Aggregate { aggregations } => format!(
            "aggregate [{}]",
            aggregations.iter().map(|a| a.output_name()).collect::<Vec<_>>().join(", ")
        ),
        Step::Sort { by, descending } => {
            format!("sort {} {}", by.join(", "), if *descending { "desc" } else { "asc" })
        }
        Step::Limit { n } => format!("limit {}", n),
        Step::Derive { name, arith, .. } => format!("derive {} ({:?})", name, arith),
        Step::PctChange { column, .. } => format!("pct_change {}", column),
        Step::Share { column, .. } => format!("share {}", column),
        Step::Forecast { value_column, horizon, .. } => {
            format!("forecast {} for {} period(s)", value_column, horizon)
        }
    }
}

fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series, Fault> {
    df.column(name).map_err(|_| {
        Fault::runtime(format!(
            "missing column '{}'; available columns: {}",
            name,
            df.get_column_names().join(", ")
        ))
    })
}

fn column_exprs(df: &DataFrame, names: &[String]) -> Result<Vec<Expr>, Fault> {
    names
        .iter()
        .map(|name| require_column(df, name).map(|_| col(name)))
        .collect()
}

fn aggregation_exprs(df: &DataFrame, aggregations: &[Aggregation]) -> Result<Vec<Expr>, Fault> {
    if aggregations.is_empty() {
        return Err(Fault::runtime("at least one aggregation is required"));
    }
    aggregations.iter().map(|agg| aggregation_expr(df, agg)).collect()
}

fn aggregation_expr(df: &DataFrame, agg: &Aggregation) -> Result<Expr, Fault> {
    let output = agg.output_name();
    let expr = match (&agg.column, agg.func) {
        (None, AggFunc::Count) => len(),
        (None, func) => {
            return Err(Fault::runtime(format!("{} needs a \"column\"", func.as_str())));
        }
        (Some(column), func) => {
            let series = require_column(df, column)?;
            if matches!(func, AggFunc::Sum | AggFunc::Mean) && !series.dtype().is_numeric() {
                return Err(Fault::runtime(format!(
                    "cannot {} column '{}' of type {}",
                    func.as_str(),
                    column,
                    series.dtype()
                )));
            }
            let c = col(column);
            match func {
                AggFunc::Sum => c.sum(),
                AggFunc::Mean => c.mean(),
                AggFunc::Min => c.min(),
                AggFunc::Max => c.max(),
                AggFunc::Count => c.count(),
                AggFunc::NUnique => c.n_unique(),
            }
        }
    };
    Ok(expr.alias(&output))
}

fn filter(
    df: DataFrame,
    column: &str,
    cmp: Comparison,
    value: &serde_json::Value,
    budget: &Budget<'_>,
) -> Result<DataFrame, Fault> {
    let dtype = require_column(&df, column)?.dtype().clone();

    let predicate = match cmp {
        Comparison::Contains => return contains(df, column, value, budget),
        Comparison::In => {
            let options = value
                .as_array()
                .ok_or_else(|| Fault::runtime("\"in\" needs a list value"))?;
            let mut predicate = lit(false);
            for option in options {
                predicate = predicate.or(comparable(column, &dtype).eq(literal_for(&dtype, option)?));
            }
            predicate
        }
        Comparison::Eq => comparable(column, &dtype).eq(literal_for(&dtype, value)?),
        Comparison::Ne => comparable(column, &dtype).neq(literal_for(&dtype, value)?),
        Comparison::Gt => comparable(column, &dtype).gt(literal_for(&dtype, value)?),
        Comparison::Ge => comparable(column, &dtype).gt_eq(literal_for(&dtype, value)?),
        Comparison::Lt => comparable(column, &dtype).lt(literal_for(&dtype, value)?),
        Comparison::Le => comparable(column, &dtype).lt_eq(literal_for(&dtype, value)?),
    };

    Ok(df.lazy().filter(predicate).collect()?)
}

/// Temporal columns are compared through their ISO text form, which orders
/// the same way as the dates themselves.
fn comparable(column: &str, dtype: &DataType) -> Expr {
    match dtype {
        DataType::Date | DataType::Datetime(_, _) => col(column).cast(DataType::String),
        _ => col(column),
    }
}

fn literal_for(dtype: &DataType, value: &serde_json::Value) -> Result<Expr, Fault> {
    match value {
        serde_json::Value::Number(n) => {
            if dtype.is_numeric() {
                match n.as_i64() {
                    Some(i) => Ok(lit(i)),
                    None => n
                        .as_f64()
                        .map(lit)
                        .ok_or_else(|| Fault::runtime(format!("unsupported number {}", n))),
                }
            } else {
                Ok(lit(n.to_string()))
            }
        }
        serde_json::Value::String(s) => {
            if dtype.is_numeric() {
                if let Ok(i) = s.trim().parse::<i64>() {
                    Ok(lit(i))
                } else if let Ok(f) = s.trim().parse::<f64>() {
                    Ok(lit(f))
                } else {
                    Err(Fault::runtime(format!(
                        "value '{}' is not a number but the column is {}",
                        s, dtype
                    )))
                }
            } else {
                Ok(lit(s.clone()))
            }
        }
        serde_json::Value::Bool(b) => Ok(lit(*b)),
        other => Err(Fault::runtime(format!("unsupported filter value {}", other))),
    }
}

/// Case-insensitive substring match on a text column.
fn contains(
    df: DataFrame,
    column: &str,
    value: &serde_json::Value,
    budget: &Budget<'_>,
) -> Result<DataFrame, Fault> {
    let needle = value
        .as_str()
        .ok_or_else(|| Fault::runtime("\"contains\" needs a text value"))?
        .to_lowercase();
    let series = require_column(&df, column)?;
    let text = series
        .str()
        .map_err(|_| Fault::runtime(format!("\"contains\" needs a text column, '{}' is {}", column, series.dtype())))?;

    let mut flags = Vec::with_capacity(text.len());
    for (idx, cell) in text.into_iter().enumerate() {
        if idx % CHECK_EVERY == 0 {
            budget.checkpoint()?;
        }
        flags.push(cell.map(|s| s.to_lowercase().contains(&needle)));
    }
    let mask: BooleanChunked = flags.into_iter().collect();
    Ok(df.filter(&mask)?)
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, Fault> {
    let series = require_column(df, name)?;
    if !series.dtype().is_numeric() {
        return Err(Fault::runtime(format!(
            "column '{}' is {} and not numeric",
            name,
            series.dtype()
        )));
    }
    let cast = series.cast(&DataType::Float64)?;
    let values = cast.f64()?.into_iter().collect();
    Ok(values)
}

fn operand_values(df: &DataFrame, operand: &Operand) -> Result<Vec<Option<f64>>, Fault> {
    match operand {
        Operand::Number(x) => Ok(vec![Some(*x); df.height()]),
        Operand::Column(name) => numeric_values(df, name),
    }
}

fn derive(
    df: DataFrame,
    name: &str,
    left: &Operand,
    arith: Arithmetic,
    right: &Operand,
    budget: &Budget<'_>,
) -> Result<DataFrame, Fault> {
    if name.trim().is_empty() {
        return Err(Fault::runtime("derive needs a non-empty \"name\""));
    }
    let lhs = operand_values(&df, left)?;
    let rhs = operand_values(&df, right)?;

    if arith == Arithmetic::Div {
        let zero_rows = rhs.iter().filter(|v| matches!(v, Some(x) if *x == 0.0)).count();
        if zero_rows > 0 {
            return Err(Fault::runtime(format!(
                "division by zero while deriving '{}': {} row(s) have a zero divisor; filter them out first",
                name, zero_rows
            )));
        }
    }

    let mut out = Vec::with_capacity(lhs.len());
    for (idx, (l, r)) in lhs.iter().zip(rhs.iter()).enumerate() {
        if idx % CHECK_EVERY == 0 {
            budget.checkpoint()?;
        }
        out.push(match (l, r) {
            (Some(a), Some(b)) => Some(match arith {
                Arithmetic::Add => a + b,
                Arithmetic::Sub => a - b,
                Arithmetic::Mul => a * b,
                Arithmetic::Div => a / b,
            }),
            _ => None,
        });
    }

    let mut df = df;
    df.with_column(Series::new(name, out))?;
    Ok(df)
}

fn pct_change(df: DataFrame, column: &str, name: &str, budget: &Budget<'_>) -> Result<DataFrame, Fault> {
    let values = numeric_values(&df, column)?;
    let mut out = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;
    for (idx, current) in values.iter().enumerate() {
        if idx % CHECK_EVERY == 0 {
            budget.checkpoint()?;
        }
        out.push(match (previous, current) {
            (Some(base), Some(value)) => {
                if base == 0.0 {
                    return Err(Fault::runtime(format!(
                        "pct_change of '{}' has a zero base at row {}",
                        column, idx
                    )));
                }
                Some((value - base) / base * 100.0)
            }
            _ => None,
        });
        previous = *current;
    }

    let mut df = df;
    df.with_column(Series::new(name, out))?;
    Ok(df)
}

fn share(df: DataFrame, column: &str, name: &str) -> Result<DataFrame, Fault> {
    let values = numeric_values(&df, column)?;
    let total: f64 = values.iter().flatten().sum();
    if total == 0.0 {
        return Err(Fault::runtime(format!("share of '{}' is undefined: the total is zero", column)));
    }
    let out: Vec<Option<f64>> = values.iter().map(|v| v.map(|x| x / total * 100.0)).collect();

    let mut df = df;
    df.with_column(Series::new(name, out))?;
    Ok(df)
}

fn forecast(df: &DataFrame, time_column: &str, value_column: &str, horizon: usize) -> Result<DataFrame, Fault> {
    if horizon == 0 || horizon > MAX_FORECAST_HORIZON {
        return Err(Fault::runtime(format!(
            "forecast horizon must be between 1 and {}, got {}",
            MAX_FORECAST_HORIZON, horizon
        )));
    }
    let time = require_column(df, time_column)?;
    let values = numeric_values(df, value_column)?;

    let mut labels = Vec::new();
    let mut observed = Vec::new();
    for (idx, value) in values.iter().enumerate() {
        if let Some(v) = value {
            labels.push(any_value_to_string(&time.get(idx)?));
            observed.push(*v);
        }
    }

    let trend = LinearTrend::fit(&observed).ok_or_else(|| {
        Fault::runtime(format!(
            "forecast needs at least two periods with a value in '{}', found {}",
            value_column,
            observed.len()
        ))
    })?;

    let periods = match future_labels(&labels, horizon) {
        FutureLabels::Integer(v) => Series::new(time_column, v),
        FutureLabels::Text(v) => Series::new(time_column, v),
    };
    let forecast = Series::new(FORECAST_COLUMN, trend.extrapolate(horizon));
    Ok(DataFrame::new(vec![periods, forecast])?)
}
