//! Agent contracts: the response shape every request ends in.

use crate::intent::Intent;
use crate::sandbox::{FailureKind, ResultValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    DataAnalyst,
    Detective,
    Forecaster,
    Strategist,
}

impl AgentKind {
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Descriptive => AgentKind::DataAnalyst,
            Intent::Diagnostic => AgentKind::Detective,
            Intent::Predictive => AgentKind::Forecaster,
            Intent::Prescriptive => AgentKind::Strategist,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::DataAnalyst => "Data Analyst Agent",
            AgentKind::Detective => "Detective Agent",
            AgentKind::Forecaster => "Forecaster Agent",
            AgentKind::Strategist => "Strategist Agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<ChartSeries>,
}

/// Why a response carries no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerError {
    InvalidQuery,
    SynthesisFailed,
    PolicyViolation,
    ResourceExceeded,
    RuntimeFault,
    DeadlineExceeded,
}

impl From<FailureKind> for AnswerError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::PolicyViolation => AnswerError::PolicyViolation,
            FailureKind::ResourceExceeded => AnswerError::ResourceExceeded,
            FailureKind::RuntimeFault => AnswerError::RuntimeFault,
        }
    }
}

impl AnswerError {
    /// User-facing explanation. Contains no internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            AnswerError::InvalidQuery => {
                "Please ask a question between 1 and 500 characters long."
            }
            AnswerError::SynthesisFailed => {
                "Sorry, I could not analyze this question. Try rephrasing it or naming the measure and period you are interested in."
            }
            AnswerError::PolicyViolation => {
                "Sorry, I could not build a safe analysis for this question. Try asking it more directly."
            }
            AnswerError::ResourceExceeded => {
                "Sorry, this analysis needed more time or produced more data than allowed. Try narrowing it to a period, division or branch."
            }
            AnswerError::RuntimeFault => {
                "Sorry, I was not able to compute an answer from the data. Check the names of the products, branches or periods in your question."
            }
            AnswerError::DeadlineExceeded => {
                "Sorry, answering this question took too long. Please try again or ask a narrower question."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub request_id: Uuid,
    pub success: bool,
    pub narrative: String,
    pub data: Option<ResultValue>,
    pub visualizations: Vec<VisualizationSpec>,
    pub agent: Option<AgentKind>,
    pub intent: Option<Intent>,
    /// e.g. "Predictive Analytics".
    pub query_type: Option<String>,
    /// Synthesis attempts made.
    pub attempts: usize,
    pub error: Option<AnswerError>,
}

impl AnswerResponse {
    pub fn answered(
        request_id: Uuid,
        intent: Intent,
        narrative: String,
        data: ResultValue,
        visualizations: Vec<VisualizationSpec>,
        attempts: usize,
    ) -> Self {
        Self {
            request_id,
            success: true,
            narrative,
            data: Some(data),
            visualizations,
            agent: Some(AgentKind::for_intent(intent)),
            intent: Some(intent),
            query_type: Some(intent.label().to_string()),
            attempts,
            error: None,
        }
    }

    pub fn failed(request_id: Uuid, intent: Option<Intent>, error: AnswerError, attempts: usize) -> Self {
        Self {
            request_id,
            success: false,
            narrative: error.user_message().to_string(),
            data: None,
            visualizations: Vec::new(),
            agent: intent.map(AgentKind::for_intent),
            intent,
            query_type: intent.map(|i| i.label().to_string()),
            attempts,
            error: Some(error),
        }
    }
}

/// Per-request pipeline stage, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Classifying,
    Retrieving,
    Synthesizing,
    Executing,
    Retrying,
    Explaining,
    Failed,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Classifying => "classifying",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Executing => "executing",
            PipelineState::Retrying => "retrying",
            PipelineState::Explaining => "explaining",
            PipelineState::Failed => "failed",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}
