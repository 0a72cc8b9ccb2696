//! insight-engine: natural-language business analytics over tabular data.
//!
//! A question is classified into an analytical intent, answered by the agent
//! for that intent through a bounded synthesize/execute loop over a
//! sandboxed program interpreter, and returned with a narrative and chart
//! hints.

pub mod agent;
pub mod config;
pub mod dataset;
pub mod error;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod query;
pub mod retrieval;
pub mod sandbox;
pub mod synthesis;

pub use agent::{AnswerError, AnswerResponse, VisualizationSpec};
pub use config::EngineConfig;
pub use error::{InsightError, Result};
pub use intent::Intent;
pub use orchestrator::{Orchestrator, ReadinessReport, ReadinessStatus};
