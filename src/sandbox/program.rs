//! Analysis programs
//!
//! A program is an untrusted JSON document naming a table, the operations it
//! declares it will use, and an ordered list of steps:
//!
//! ```json
//! {
//!   "table": "sales",
//!   "uses": ["filter", "aggregate"],
//!   "steps": [
//!     {"op": "filter", "column": "Year", "cmp": "eq", "value": 2024},
//!     {"op": "aggregate", "aggregations": [{"func": "sum", "column": "Net_Amount_BDT", "alias": "total_sales"}]}
//!   ]
//! }
//! ```
//!
//! The document only ever reaches the typed [`Program`] after the policy gate
//! has accepted its operation names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Every operation the interpreter knows. The allow-list is a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Filter,
    Select,
    Group,
    Aggregate,
    Sort,
    Limit,
    Derive,
    PctChange,
    Share,
    Forecast,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Filter,
        Operation::Select,
        Operation::Group,
        Operation::Aggregate,
        Operation::Sort,
        Operation::Limit,
        Operation::Derive,
        Operation::PctChange,
        Operation::Share,
        Operation::Forecast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Filter => "filter",
            Operation::Select => "select",
            Operation::Group => "group",
            Operation::Aggregate => "aggregate",
            Operation::Sort => "sort",
            Operation::Limit => "limit",
            Operation::Derive => "derive",
            Operation::PctChange => "pct_change",
            Operation::Share => "share",
            Operation::Forecast => "forecast",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }

    /// One-line usage shown to the model.
    pub fn usage(&self) -> &'static str {
        match self {
            Operation::Filter => {
                r#"{"op":"filter","column":C,"cmp":"eq|ne|gt|ge|lt|le|in|contains","value":V}  keep matching rows"#
            }
            Operation::Select => r#"{"op":"select","columns":[C,...]}  keep only these columns"#,
            Operation::Group => {
                r#"{"op":"group","by":[C,...],"aggregations":[AGG,...]}  one row per group"#
            }
            Operation::Aggregate => {
                r#"{"op":"aggregate","aggregations":[AGG,...]}  one row for the whole table"#
            }
            Operation::Sort => r#"{"op":"sort","by":[C,...],"descending":true|false}"#,
            Operation::Limit => r#"{"op":"limit","n":N}  first N rows"#,
            Operation::Derive => {
                r#"{"op":"derive","name":NEW,"left":C|NUMBER,"arith":"add|sub|mul|div","right":C|NUMBER}"#
            }
            Operation::PctChange => {
                r#"{"op":"pct_change","column":C,"alias":NEW}  change vs previous row in percent"#
            }
            Operation::Share => {
                r#"{"op":"share","column":C,"alias":NEW}  percent of the column total"#
            }
            Operation::Forecast => {
                r#"{"op":"forecast","time_column":C,"value_column":C,"horizon":N}  linear trend over current row order, returns N future periods"#
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(alias = "==", alias = "=")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    In,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Sum,
    #[serde(alias = "avg", alias = "average")]
    Mean,
    Min,
    Max,
    Count,
    NUnique,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::NUnique => "n_unique",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub func: AggFunc,
    /// Optional only for `count`, which then counts rows.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.column) {
            (Some(alias), _) => alias.clone(),
            (None, Some(column)) => format!("{}_{}", column, self.func.as_str()),
            (None, None) => self.func.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Column(String),
}

fn default_horizon() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Filter {
        column: String,
        cmp: Comparison,
        value: serde_json::Value,
    },
    Select {
        columns: Vec<String>,
    },
    Group {
        by: Vec<String>,
        aggregations: Vec<Aggregation>,
    },
    Aggregate {
        aggregations: Vec<Aggregation>,
    },
    Sort {
        by: Vec<String>,
        #[serde(default)]
        descending: bool,
    },
    Limit {
        n: usize,
    },
    Derive {
        name: String,
        left: Operand,
        arith: Arithmetic,
        right: Operand,
    },
    PctChange {
        column: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Share {
        column: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Forecast {
        time_column: String,
        value_column: String,
        #[serde(default = "default_horizon")]
        horizon: usize,
    },
}

impl Step {
    pub fn operation(&self) -> Operation {
        match self {
            Step::Filter { .. } => Operation::Filter,
            Step::Select { .. } => Operation::Select,
            Step::Group { .. } => Operation::Group,
            Step::Aggregate { .. } => Operation::Aggregate,
            Step::Sort { .. } => Operation::Sort,
            Step::Limit { .. } => Operation::Limit,
            Step::Derive { .. } => Operation::Derive,
            Step::PctChange { .. } => Operation::PctChange,
            Step::Share { .. } => Operation::Share,
            Step::Forecast { .. } => Operation::Forecast,
        }
    }
}

/// Typed program, produced only by the policy gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub table: String,
    pub uses: Vec<String>,
    pub steps: Vec<Step>,
}

/// A candidate program from the synthesizer. Its declared operations are the
/// raw names from the `uses` header, unknown names included, so that the gate
/// can reject them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub source: String,
    pub declared_operations: BTreeSet<String>,
    pub explanation_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgramFormatError {
    #[error("program is empty")]
    Empty,
    #[error("program is not valid JSON: {0}")]
    NotJson(String),
    #[error("program must be a JSON object")]
    NotAnObject,
    #[error("program has no \"uses\" list of operation names")]
    MissingUses,
}

impl GeneratedProgram {
    /// Read the declared operations from the program header. Steps are not
    /// inspected here.
    pub fn from_source(
        source: impl Into<String>,
        explanation_template: Option<String>,
    ) -> Result<Self, ProgramFormatError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(ProgramFormatError::Empty);
        }
        let value: serde_json::Value = serde_json::from_str(&source)
            .map_err(|e| ProgramFormatError::NotJson(e.to_string()))?;
        let object = value.as_object().ok_or(ProgramFormatError::NotAnObject)?;
        let uses = object
            .get("uses")
            .and_then(|u| u.as_array())
            .ok_or(ProgramFormatError::MissingUses)?;
        let declared_operations = uses
            .iter()
            .map(|u| u.as_str().map(|s| s.to_string()))
            .collect::<Option<BTreeSet<String>>>()
            .ok_or(ProgramFormatError::MissingUses)?;

        Ok(Self {
            source,
            declared_operations,
            explanation_template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_source_reads_header() {
        let program = GeneratedProgram::from_source(
            r#"{"table":"sales","uses":["filter","aggregate"],"steps":[]}"#,
            None,
        )
        .unwrap();
        assert_eq!(
            program.declared_operations.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["aggregate", "filter"]
        );
    }

    #[test]
    fn test_from_source_errors() {
        assert_eq!(GeneratedProgram::from_source("  ", None), Err(ProgramFormatError::Empty));
        assert!(matches!(
            GeneratedProgram::from_source("df.sum()", None),
            Err(ProgramFormatError::NotJson(_))
        ));
        assert_eq!(
            GeneratedProgram::from_source(r#"{"table":"sales","steps":[]}"#, None),
            Err(ProgramFormatError::MissingUses)
        );
    }

    #[test]
    fn test_step_deserialization_with_aliases() {
        let step: Step = serde_json::from_str(
            r#"{"op":"filter","column":"Year","cmp":">=","value":2023}"#,
        )
        .unwrap();
        assert_eq!(step.operation(), Operation::Filter);

        let step: Step = serde_json::from_str(
            r#"{"op":"derive","name":"margin","left":"Profit_BDT","arith":"div","right":100}"#,
        )
        .unwrap();
        match step {
            Step::Derive { left, right, .. } => {
                assert_eq!(left, Operand::Column("Profit_BDT".into()));
                assert_eq!(right, Operand::Number(100.0));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_operation_names_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_name("exec"), None);
    }
}
