//! Engine Configuration
//!
//! Every numeric limit the pipeline enforces lives here as a named default
//! with an environment override. `EngineConfig::from_env` is read once at
//! startup; nothing below the orchestrator consults the environment.

use crate::error::{InsightError, Result};
use crate::sandbox::ExecutionLimits;
use std::str::FromStr;
use std::time::Duration;

/// Wall-clock budget for one program execution.
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 5_000;
/// Ceiling on the estimated size of any intermediate frame.
pub const DEFAULT_EXEC_MEMORY_MB: usize = 512;
/// Maximum number of steps a program may contain.
pub const DEFAULT_EXEC_MAX_STEPS: usize = 32;
/// Maximum rows in a successful result.
pub const DEFAULT_EXEC_MAX_ROWS: usize = 200;
/// Maximum cells (rows x columns) in a successful result.
pub const DEFAULT_EXEC_MAX_CELLS: usize = 2_000;
/// Additional synthesis attempts after the first one.
pub const DEFAULT_RETRY_CAP: usize = 2;
/// Number of context chunks requested from the vector index.
pub const DEFAULT_RAG_TOP_K: usize = 5;
/// Chunks scoring below this are discarded.
pub const DEFAULT_RAG_MIN_SCORE: f32 = 0.2;
pub const DEFAULT_RAG_TIMEOUT_MS: u64 = 3_000;
/// Character budget for retrieved context inside a prompt.
pub const DEFAULT_CONTEXT_CHARS: usize = 4_000;
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 30_000;
/// Provider-level retries for transient model failures.
pub const DEFAULT_LLM_RETRIES: usize = 2;
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 8_000;
/// Overall budget for one request, independent of the per-call timeouts.
pub const DEFAULT_REQUEST_DEADLINE_MS: u64 = 120_000;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_RAG_TOP_K,
            min_score: DEFAULT_RAG_MIN_SCORE,
            timeout: Duration::from_millis(DEFAULT_RAG_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub provider_retries: usize,
    pub max_context_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_LLM_TEMPERATURE,
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
            timeout: Duration::from_millis(DEFAULT_LLM_TIMEOUT_MS),
            provider_retries: DEFAULT_LLM_RETRIES,
            max_context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }
}

/// Connection settings for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub limits: ExecutionLimits,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    pub provider: ProviderConfig,
    pub retry_cap: usize,
    pub request_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ExecutionLimits::default(),
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisConfig::default(),
            provider: ProviderConfig::default(),
            retry_cap: DEFAULT_RETRY_CAP,
            request_deadline: Duration::from_millis(DEFAULT_REQUEST_DEADLINE_MS),
        }
    }
}

impl EngineConfig {
    /// Build the configuration from defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let limits = ExecutionLimits {
            time_limit: Duration::from_millis(env_or("INSIGHT_EXEC_TIMEOUT_MS", DEFAULT_EXEC_TIMEOUT_MS)?),
            memory_limit_bytes: env_or("INSIGHT_EXEC_MEMORY_MB", DEFAULT_EXEC_MEMORY_MB)? * 1024 * 1024,
            max_steps: env_or("INSIGHT_EXEC_MAX_STEPS", DEFAULT_EXEC_MAX_STEPS)?,
            max_result_rows: env_or("INSIGHT_EXEC_MAX_ROWS", DEFAULT_EXEC_MAX_ROWS)?,
            max_result_cells: env_or("INSIGHT_EXEC_MAX_CELLS", DEFAULT_EXEC_MAX_CELLS)?,
        };

        let retrieval = RetrievalConfig {
            top_k: env_or("INSIGHT_RAG_TOP_K", DEFAULT_RAG_TOP_K)?,
            min_score: env_or("INSIGHT_RAG_MIN_SCORE", DEFAULT_RAG_MIN_SCORE)?,
            timeout: Duration::from_millis(env_or("INSIGHT_RAG_TIMEOUT_MS", DEFAULT_RAG_TIMEOUT_MS)?),
        };

        let synthesis = SynthesisConfig {
            temperature: env_or("INSIGHT_LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?,
            max_tokens: env_or("INSIGHT_LLM_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS)?,
            timeout: Duration::from_millis(env_or("INSIGHT_LLM_TIMEOUT_MS", DEFAULT_LLM_TIMEOUT_MS)?),
            provider_retries: env_or("INSIGHT_LLM_RETRIES", DEFAULT_LLM_RETRIES)?,
            max_context_chars: env_or("INSIGHT_CONTEXT_CHARS", DEFAULT_CONTEXT_CHARS)?,
        };

        let provider = ProviderConfig {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
        };

        let config = Self {
            limits,
            retrieval,
            synthesis,
            provider,
            retry_cap: env_or("INSIGHT_RETRY_CAP", DEFAULT_RETRY_CAP)?,
            request_deadline: Duration::from_millis(env_or(
                "INSIGHT_REQUEST_DEADLINE_MS",
                DEFAULT_REQUEST_DEADLINE_MS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(InsightError::Config("INSIGHT_RAG_TOP_K must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(InsightError::Config(format!(
                "INSIGHT_RAG_MIN_SCORE must be within [0, 1], got {}",
                self.retrieval.min_score
            )));
        }
        if self.limits.max_steps == 0 || self.limits.max_result_rows == 0 {
            return Err(InsightError::Config(
                "execution step and row limits must be positive".to_string(),
            ));
        }
        if self.request_deadline.is_zero() || self.limits.time_limit.is_zero() {
            return Err(InsightError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            InsightError::Config(format!("{} has an invalid value: {:?}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}
