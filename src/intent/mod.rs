//! Analytical Intent
//!
//! Every query is assigned exactly one intent, which selects the agent that
//! answers it.

pub mod classifier;

pub use classifier::{Classification, IntentClassifier};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// What happened: totals, breakdowns, rankings.
    Descriptive,
    /// Why it happened: decomposition by drivers, period comparison.
    Diagnostic,
    /// What will happen: trend extrapolation.
    Predictive,
    /// What to do: comparing and ranking options.
    Prescriptive,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Descriptive,
        Intent::Diagnostic,
        Intent::Predictive,
        Intent::Prescriptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Descriptive => "descriptive",
            Intent::Diagnostic => "diagnostic",
            Intent::Predictive => "predictive",
            Intent::Prescriptive => "prescriptive",
        }
    }

    /// Label shown to users, e.g. "Predictive Analytics".
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Descriptive => "Descriptive Analytics",
            Intent::Diagnostic => "Diagnostic Analytics",
            Intent::Predictive => "Predictive Analytics",
            Intent::Prescriptive => "Prescriptive Analytics",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
