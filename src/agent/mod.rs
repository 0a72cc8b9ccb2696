//! Analysis agents
//!
//! Four agents, one per intent, sharing a single retrieve/synthesize/execute
//! loop and differing only in their strategy.

pub mod analyst;
pub mod contracts;
pub mod recovery;
pub mod strategy;
pub mod visualization;

pub use analyst::{AgentServices, AnalysisAgent};
pub use contracts::{
    AgentKind, AnswerError, AnswerResponse, ChartSeries, ChartType, PipelineState, VisualizationSpec,
};
pub use strategy::{
    AgentStrategy, DescriptiveStrategy, DiagnosticStrategy, PredictiveStrategy, PrescriptiveStrategy,
};
