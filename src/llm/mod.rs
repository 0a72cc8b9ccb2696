//! Language model access
//!
//! The model is an external collaborator behind [`LanguageModel`]. Transient
//! provider failures are retried with backoff by [`retry::RetryPolicy`]; every
//! call is additionally bounded by the caller's I/O timeout.

pub mod openai;
pub mod retry;

pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Optional system message prepended to the conversation.
    pub system: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 8000,
            system: None,
        }
    }
}

impl CompletionOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Network trouble, throttling, timeouts and 5xx are worth another try;
    /// auth failures and malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Auth(_) | ProviderError::InvalidResponse(_) => false,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError>;

    async fn health_check(&self) -> bool;
}
