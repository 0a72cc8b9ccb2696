#![allow(dead_code)]

use async_trait::async_trait;
use insight_engine::agent::AgentServices;
use insight_engine::config::{RetrievalConfig, SynthesisConfig};
use insight_engine::dataset::{DatasetSnapshot, DatasetStore, InMemoryDatasetStore};
use insight_engine::llm::{CompletionOptions, LanguageModel, ProviderError, RetryPolicy};
use insight_engine::retrieval::{
    ContextRetriever, Embedding, HashingEmbedder, InMemoryVectorIndex, IndexError, ScoredChunk,
    VectorIndex,
};
use insight_engine::sandbox::{
    AllowList, ExecutionLimits, ExecutionResult, FailureKind, GeneratedProgram, ProgramExecutor,
    SandboxedExecutor,
};
use insight_engine::synthesis::prompts::SYNTHESIS_SYSTEM_PROMPT;
use insight_engine::synthesis::ProgramSynthesizer;
use insight_engine::{InsightError, Orchestrator};
use polars::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMBEDDING_DIM: usize = 64;

/// Sales fact table. Steel never records orders, so dividing by its order
/// count fails.
pub fn sales_frame() -> DataFrame {
    df![
        "Year" => [2022i64, 2022, 2023, 2023, 2024, 2024],
        "Division_Name" => ["Cement", "Steel", "Cement", "Steel", "Cement", "Steel"],
        "Branch_Name" => ["Dhaka", "Chittagong", "Dhaka", "Chittagong", "Dhaka", "Chittagong"],
        "Net_Amount_BDT" => [1000.0, 500.0, 1100.0, 600.0, 1_200_000.0, 34_567.5],
        "Profit_BDT" => [100.0, 50.0, 110.0, 60.0, 120.0, 70.0],
        "Order_Count" => [10i64, 0, 11, 0, 12, 0],
    ]
    .unwrap()
}

pub fn snapshot() -> DatasetSnapshot {
    DatasetSnapshot::new("sales", vec![("sales".to_string(), sales_frame())]).unwrap()
}

/// A model response holding one program and an explanation line.
pub fn program_response(program: &str, explanation: &str) -> String {
    format!(
        "Here is the analysis.\n\n```json\n{}\n```\n\nExplanation: {}",
        program, explanation
    )
}

pub const TOTAL_SALES_2024: &str = r#"{
  "table": "sales",
  "uses": ["filter", "aggregate"],
  "steps": [
    {"op": "filter", "column": "Year", "cmp": "eq", "value": 2024},
    {"op": "aggregate", "aggregations": [{"func": "sum", "column": "Net_Amount_BDT", "alias": "total_sales"}]}
  ]
}"#;

/// Replays scripted synthesis responses in order and records every
/// synthesis prompt. Narrative requests always fail, so narratives come from
/// templates or the deterministic summary.
pub struct ScriptedModel {
    script: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
    narrative_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
            narrative_calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Waits this long before answering a synthesis request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answers every synthesis request with the same response.
    pub fn repeating(response: String) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn synthesis_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn synthesis_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn narrative_calls(&self) -> usize {
        self.narrative_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError> {
        if options.system.as_deref() != Some(SYNTHESIS_SYSTEM_PROMPT) {
            self.narrative_calls.fetch_add(1, Ordering::SeqCst);
            return Err(ProviderError::InvalidResponse("no narrative scripted".to_string()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".to_string()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// An index whose backend is always down.
pub struct UnreachableIndex;

#[async_trait]
impl VectorIndex for UnreachableIndex {
    async fn nearest_neighbors(&self, _embedding: &Embedding, _k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        Err(IndexError::Unreachable("connection refused".to_string()))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

/// Fails every program with a runtime fault, without running it.
pub struct FailingExecutor {
    allow_list: AllowList,
    calls: AtomicUsize,
}

impl FailingExecutor {
    pub fn new() -> Self {
        Self {
            allow_list: AllowList::standard(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgramExecutor for FailingExecutor {
    async fn execute(
        &self,
        _program: GeneratedProgram,
        _snapshot: &DatasetSnapshot,
        _limits: &ExecutionLimits,
    ) -> ExecutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ExecutionResult::Failure {
            kind: FailureKind::RuntimeFault,
            message: "column 'Sales' not found".to_string(),
        }
    }

    fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }
}

/// A store that cannot serve snapshots.
pub struct DownStore;

#[async_trait]
impl DatasetStore for DownStore {
    async fn snapshot(&self) -> insight_engine::Result<DatasetSnapshot> {
        Err(InsightError::DatasetUnavailable("warehouse offline".to_string()))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

/// `rows` sales lines spread over many branch names, for runs that must
/// take measurable time.
pub fn large_sales_frame(rows: usize) -> DataFrame {
    let branches: Vec<String> = (0..rows).map(|i| format!("Branch-{}", i % 9_973)).collect();
    let amounts: Vec<f64> = (0..rows).map(|i| (i % 1_000) as f64).collect();
    df![
        "Branch_Name" => branches,
        "Net_Amount_BDT" => amounts,
    ]
    .unwrap()
}

pub fn empty_index() -> Arc<dyn VectorIndex> {
    Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIM))
}

pub struct Harness {
    pub store: Arc<dyn DatasetStore>,
    pub index: Arc<dyn VectorIndex>,
    pub executor: Arc<dyn ProgramExecutor>,
    pub limits: ExecutionLimits,
    pub deadline: Duration,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            store: Arc::new(InMemoryDatasetStore::new("sales", vec![("sales".to_string(), sales_frame())]).unwrap()),
            index: empty_index(),
            executor: Arc::new(SandboxedExecutor::default()),
            limits: ExecutionLimits::default(),
            deadline: Duration::from_secs(10),
        }
    }
}

impl Harness {
    pub fn orchestrator(self, model: Arc<ScriptedModel>) -> Orchestrator {
        let model: Arc<dyn LanguageModel> = model;
        let retrieval = RetrievalConfig {
            timeout: Duration::from_millis(500),
            ..RetrievalConfig::default()
        };
        let synthesizer = ProgramSynthesizer::new(model, AllowList::standard(), &SynthesisConfig::default())
            .with_retry_policy(RetryPolicy::immediate(0));
        let services = AgentServices {
            retriever: Arc::new(ContextRetriever::from_config(
                self.index,
                Arc::new(HashingEmbedder::new(EMBEDDING_DIM)),
                &retrieval,
            )),
            synthesizer: Arc::new(synthesizer),
            executor: self.executor,
            retrieval,
            limits: self.limits,
            retry_cap: 2,
        };
        Orchestrator::new(self.store, services, self.deadline)
    }
}
