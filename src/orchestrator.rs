//! Orchestrator
//!
//! Entry point for a question: validate, snapshot, classify, hand the query
//! to the agent for its intent, and bound the whole thing by the request
//! deadline.

use crate::agent::strategy::{DescriptiveStrategy, DiagnosticStrategy, PredictiveStrategy, PrescriptiveStrategy};
use crate::agent::{AgentServices, AnalysisAgent, AnswerError, AnswerResponse, PipelineState};
use crate::config::EngineConfig;
use crate::dataset::{DataSummary, DatasetStore};
use crate::error::Result;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::LanguageModel;
use crate::query::Query;
use crate::retrieval::{ContextRetriever, Embedder, VectorIndex};
use crate::sandbox::{ProgramExecutor, SandboxedExecutor};
use crate::synthesis::ProgramSynthesizer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One agent per intent, built once at start.
struct AgentRoster {
    descriptive: AnalysisAgent,
    diagnostic: AnalysisAgent,
    predictive: AnalysisAgent,
    prescriptive: AnalysisAgent,
}

impl AgentRoster {
    fn new(services: &AgentServices) -> Self {
        Self {
            descriptive: AnalysisAgent::new(Box::new(DescriptiveStrategy), services.clone()),
            diagnostic: AnalysisAgent::new(Box::new(DiagnosticStrategy), services.clone()),
            predictive: AnalysisAgent::new(Box::new(PredictiveStrategy), services.clone()),
            prescriptive: AnalysisAgent::new(Box::new(PrescriptiveStrategy), services.clone()),
        }
    }

    fn for_intent(&self, intent: Intent) -> &AnalysisAgent {
        match intent {
            Intent::Descriptive => &self.descriptive,
            Intent::Diagnostic => &self.diagnostic,
            Intent::Predictive => &self.predictive,
            Intent::Prescriptive => &self.prescriptive,
        }
    }

    fn names(&self) -> Vec<String> {
        Intent::ALL
            .iter()
            .map(|intent| self.for_intent(*intent).name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Ready,
    /// Answers are possible but retrieval or the model is impaired.
    Degraded,
    /// No dataset: every request would fail.
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub dataset: bool,
    pub vector_index: bool,
    pub language_model: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub status: ReadinessStatus,
    pub services: ServiceStatus,
    pub agents: Vec<String>,
    /// `None` when the store cannot serve a snapshot.
    pub data_summary: Option<DataSummary>,
}

pub struct Orchestrator {
    store: Arc<dyn DatasetStore>,
    classifier: IntentClassifier,
    agents: AgentRoster,
    retriever: Arc<ContextRetriever>,
    synthesizer: Arc<ProgramSynthesizer>,
    request_deadline: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn DatasetStore>, services: AgentServices, request_deadline: Duration) -> Self {
        let agents = AgentRoster::new(&services);
        info!("Orchestrator ready with agents: {}", agents.names().join(", "));
        Self {
            store,
            classifier: IntentClassifier::new(),
            agents,
            retriever: services.retriever,
            synthesizer: services.synthesizer,
            request_deadline,
        }
    }

    /// Wire the standard executor and the configured limits around the
    /// given collaborators.
    pub fn from_config(
        store: Arc<dyn DatasetStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: &EngineConfig,
    ) -> Self {
        let executor = SandboxedExecutor::default();
        let synthesizer = ProgramSynthesizer::new(model, executor.allow_list().clone(), &config.synthesis);
        let executor: Arc<dyn ProgramExecutor> = Arc::new(executor);
        let services = AgentServices {
            retriever: Arc::new(ContextRetriever::from_config(index, embedder, &config.retrieval)),
            synthesizer: Arc::new(synthesizer),
            executor,
            retrieval: config.retrieval.clone(),
            limits: config.limits.clone(),
            retry_cap: config.retry_cap,
        };
        Self::new(store, services, config.request_deadline)
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Answer a question. `Err` only when the dataset store cannot serve a
    /// snapshot; invalid text and deadline expiry are ordinary responses.
    pub async fn handle(&self, raw: &str) -> Result<AnswerResponse> {
        let query = match Query::parse(raw) {
            Ok(query) => query,
            Err(err) => {
                warn!("Rejected query: {}", err);
                return Ok(AnswerResponse::failed(Uuid::new_v4(), None, AnswerError::InvalidQuery, 0));
            }
        };
        let request_id = query.id();

        let snapshot = self.store.snapshot().await.map_err(|err| {
            error!(request_id = %request_id, "dataset snapshot unavailable: {}", err);
            err
        })?;

        debug!(request_id = %request_id, state = %PipelineState::Classifying, "pipeline state");
        let classification = self.classifier.explain(query.text());
        let agent = self.agents.for_intent(classification.intent);
        info!(
            request_id = %request_id,
            intent = classification.intent.as_str(),
            matched = classification.matched.as_deref().unwrap_or("-"),
            agent = agent.name(),
            snapshot_version = snapshot.version(),
            "query classified"
        );

        match tokio::time::timeout(self.request_deadline, agent.answer(&query, &snapshot)).await {
            Ok(response) => {
                info!(
                    request_id = %request_id,
                    success = response.success,
                    elapsed_ms = elapsed_ms(&query),
                    "request finished"
                );
                Ok(response)
            }
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    deadline_ms = self.request_deadline.as_millis() as u64,
                    elapsed_ms = elapsed_ms(&query),
                    "request deadline exceeded"
                );
                Ok(AnswerResponse::failed(
                    request_id,
                    Some(classification.intent),
                    AnswerError::DeadlineExceeded,
                    0,
                ))
            }
        }
    }

    /// Status of the three backing services and the agent roster.
    pub async fn readiness(&self) -> ReadinessReport {
        let (dataset, vector_index, language_model) = tokio::join!(
            self.store.health_check(),
            self.retriever.health_check(),
            self.synthesizer.health_check(),
        );
        let status = if !dataset {
            ReadinessStatus::NotReady
        } else if vector_index && language_model {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::Degraded
        };
        let data_summary = if dataset {
            self.store.snapshot().await.ok().map(|snapshot| snapshot.summary())
        } else {
            None
        };
        ReadinessReport {
            status,
            services: ServiceStatus { dataset, vector_index, language_model },
            agents: self.agents.names(),
            data_summary,
        }
    }
}

fn elapsed_ms(query: &Query) -> i64 {
    (Utc::now() - query.received_at()).num_milliseconds()
}
