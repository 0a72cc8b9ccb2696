//! Analysis Agent
//!
//! One loop shared by every strategy: retrieve, synthesize, execute, and on
//! failure retry within the budget.

use super::contracts::{AnswerResponse, PipelineState};
use super::recovery::{AttemptFailure, RetryBudget, RetryPlan};
use super::strategy::AgentStrategy;
use super::visualization::derive_visualizations;
use crate::config::RetrievalConfig;
use crate::dataset::DatasetSnapshot;
use crate::intent::Intent;
use crate::query::Query;
use crate::retrieval::{ContextRetriever, RetrievedContext};
use crate::sandbox::{ExecutionLimits, ExecutionResult, ProgramExecutor, ResultValue};
use crate::synthesis::{PriorFailure, ProgramSynthesizer, SynthesisRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Service handles shared by all agents.
#[derive(Clone)]
pub struct AgentServices {
    pub retriever: Arc<ContextRetriever>,
    pub synthesizer: Arc<ProgramSynthesizer>,
    pub executor: Arc<dyn ProgramExecutor>,
    pub retrieval: RetrievalConfig,
    pub limits: ExecutionLimits,
    pub retry_cap: usize,
}

pub struct AnalysisAgent {
    strategy: Box<dyn AgentStrategy>,
    services: AgentServices,
}

impl AnalysisAgent {
    pub fn new(strategy: Box<dyn AgentStrategy>, services: AgentServices) -> Self {
        Self { strategy, services }
    }

    pub fn intent(&self) -> Intent {
        self.strategy.intent()
    }

    pub fn name(&self) -> &'static str {
        self.strategy.kind().display_name()
    }

    /// Answer one query against one snapshot. Never fails: every problem
    /// ends in a response with `success = false`.
    pub async fn answer(&self, query: &Query, snapshot: &DatasetSnapshot) -> AnswerResponse {
        let request_id = query.id();
        let intent = self.intent();
        let agent = self.name();

        transition(query, PipelineState::Retrieving);
        let context = self
            .services
            .retriever
            .retrieve_kinds(
                query.text(),
                self.strategy.context_kinds(),
                self.services.retrieval.top_k,
                self.services.retrieval.min_score,
            )
            .await;
        debug!(request_id = %request_id, chunks = context.len(), "context retrieved");

        let mut budget = RetryBudget::new(self.services.retry_cap);
        let mut prior: Option<PriorFailure> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            transition(query, PipelineState::Synthesizing);
            info!(request_id = %request_id, agent, attempt, "analysis attempt");

            let failure = match self.attempt(query, snapshot, &context, prior.as_ref(), attempt, budget.simplified()).await {
                Ok((value, template)) => {
                    transition(query, PipelineState::Explaining);
                    let value = self.strategy.refine(value);
                    let narrative = self
                        .services
                        .synthesizer
                        .render_narrative(query.text(), template.as_deref(), &value, self.strategy.narrative_style())
                        .await;
                    let visualizations = derive_visualizations(&value, query.text());
                    info!(
                        request_id = %request_id,
                        agent,
                        attempts = attempt,
                        retries = budget.retries_used(),
                        shape = value.shape(),
                        charts = visualizations.len(),
                        "analysis succeeded"
                    );
                    transition(query, PipelineState::Done);
                    return AnswerResponse::answered(request_id, intent, narrative, value, visualizations, attempt);
                }
                Err(failure) => failure,
            };

            match budget.next(&failure) {
                Some(plan) => {
                    warn!(
                        request_id = %request_id,
                        agent,
                        attempt,
                        kind = %failure.kind_name(),
                        "attempt failed, retrying"
                    );
                    transition(query, PipelineState::Retrying);
                    prior = match plan {
                        RetryPlan::Revise(p) => Some(p),
                        RetryPlan::Simplify => None,
                    };
                }
                None => {
                    warn!(
                        request_id = %request_id,
                        agent,
                        attempts = attempt,
                        retries = budget.retries_used(),
                        kind = %failure.kind_name(),
                        "analysis failed, retry budget exhausted"
                    );
                    transition(query, PipelineState::Failed);
                    transition(query, PipelineState::Done);
                    return AnswerResponse::failed(request_id, Some(intent), failure.answer_error(), attempt);
                }
            }
        }
    }

    /// One synthesis plus, if it produced a program, one execution.
    async fn attempt(
        &self,
        query: &Query,
        snapshot: &DatasetSnapshot,
        context: &RetrievedContext,
        prior: Option<&PriorFailure>,
        attempt: usize,
        simplified: bool,
    ) -> Result<(ResultValue, Option<String>), AttemptFailure> {
        let request = SynthesisRequest {
            query: query.text(),
            context,
            schema: snapshot.schema(),
            primary_table: snapshot.primary_table(),
            guidance: self.strategy.guidance(),
            prior_failure: prior,
            attempt,
            simplified,
        };
        let program = self
            .services
            .synthesizer
            .synthesize(&request)
            .await
            .map_err(|err| {
                warn!(request_id = %query.id(), attempt, error = %err, "synthesis failed");
                AttemptFailure::Synthesis(err)
            })?;

        transition(query, PipelineState::Executing);
        let source = program.source.clone();
        let template = program.explanation_template.clone();
        match self.services.executor.execute(program, snapshot, &self.services.limits).await {
            ExecutionResult::Success { value, log } => {
                debug!(request_id = %query.id(), steps = log.entries.len(), "program executed");
                Ok((value, template))
            }
            ExecutionResult::Failure { kind, message } => {
                warn!(request_id = %query.id(), attempt, kind = %kind, "execution failed: {}", message);
                Err(AttemptFailure::Execution { source, kind, message })
            }
        }
    }
}

fn transition(query: &Query, state: PipelineState) {
    debug!(request_id = %query.id(), state = %state, "pipeline state");
}
