//! Program Synthesizer
//!
//! Turns a question plus schema and context into a candidate
//! [`GeneratedProgram`] by prompting the language model, and turns a computed
//! result back into prose. It never executes anything.

pub mod narrative;
pub mod parser;
pub mod prompts;

pub use prompts::PriorFailure;

use crate::config::SynthesisConfig;
use crate::dataset::SchemaDescription;
use crate::llm::retry::complete_with_retry;
use crate::llm::{CompletionOptions, LanguageModel, ProviderError, RetryPolicy};
use crate::retrieval::RetrievedContext;
use crate::sandbox::{AllowList, GeneratedProgram, ProgramFormatError, ResultValue};
use prompts::PromptInput;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Narratives are short; no need for the full token budget.
const NARRATIVE_MAX_TOKENS: u32 = 300;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("language model unavailable: {0}")]
    Provider(#[from] ProviderError),
    #[error("response contained no program code block")]
    MissingProgram,
    #[error("invalid program: {0}")]
    InvalidProgram(#[from] ProgramFormatError),
}

pub struct SynthesisRequest<'a> {
    pub query: &'a str,
    pub context: &'a RetrievedContext,
    pub schema: &'a SchemaDescription,
    pub primary_table: &'a str,
    /// Strategy-specific instructions from the agent.
    pub guidance: &'a str,
    pub prior_failure: Option<&'a PriorFailure>,
    /// 1-based synthesis attempt number.
    pub attempt: usize,
    pub simplified: bool,
}

pub struct ProgramSynthesizer {
    model: Arc<dyn LanguageModel>,
    allow_list: AllowList,
    options: CompletionOptions,
    retry: RetryPolicy,
    timeout: Duration,
    max_context_chars: usize,
}

impl ProgramSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, allow_list: AllowList, config: &SynthesisConfig) -> Self {
        Self {
            model,
            allow_list,
            options: CompletionOptions {
                temperature: config.temperature,
                ..CompletionOptions::default()
            }
            .with_max_tokens(config.max_tokens)
            .with_system(prompts::SYNTHESIS_SYSTEM_PROMPT),
            retry: RetryPolicy::with_max_retries(config.provider_retries),
            timeout: config.timeout,
            max_context_chars: config.max_context_chars,
        }
    }

    /// Replace the provider retry policy (tests use immediate retries).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn build_prompt(&self, request: &SynthesisRequest<'_>) -> String {
        let input = PromptInput {
            query: request.query,
            schema: request.schema,
            primary_table: request.primary_table,
            context: request.context,
            guidance: request.guidance,
            allow_list: &self.allow_list,
            max_context_chars: self.max_context_chars,
        };
        let body = if request.simplified {
            prompts::build_simplified_prompt(&input)
        } else {
            prompts::build_prompt(&input)
        };
        match request.prior_failure {
            Some(prior) => format!(
                "{}\n\n{}",
                prompts::build_revision_prompt(prior, request.attempt, &self.allow_list),
                body
            ),
            None => body,
        }
    }

    pub async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<GeneratedProgram, SynthesisError> {
        let prompt = self.build_prompt(request);
        debug!(
            attempt = request.attempt,
            simplified = request.simplified,
            revision = request.prior_failure.is_some(),
            prompt_chars = prompt.len(),
            "synthesizing program"
        );

        let response = complete_with_retry(
            self.model.as_ref(),
            &prompt,
            &self.options,
            &self.retry,
            self.timeout,
        )
        .await?;

        let parsed = parser::parse_response(&response);
        let source = parsed.program.ok_or(SynthesisError::MissingProgram)?;
        let program = GeneratedProgram::from_source(source, parsed.explanation)?;
        Ok(program)
    }

    /// Narrative for a successful result: the explanation template when it
    /// has a placeholder, else a short model-written answer, else a
    /// deterministic summary.
    pub async fn render_narrative(
        &self,
        query: &str,
        template: Option<&str>,
        value: &ResultValue,
        style: &str,
    ) -> String {
        if let Some(filled) = template.and_then(|t| narrative::fill_template(t, value)) {
            return filled;
        }

        let prompt = prompts::build_narrative_prompt(query, &narrative::render_for_prompt(value), style);
        let options = self
            .options
            .clone()
            .with_max_tokens(NARRATIVE_MAX_TOKENS.min(self.options.max_tokens))
            .with_system(prompts::NARRATIVE_SYSTEM_PROMPT);
        match complete_with_retry(self.model.as_ref(), &prompt, &options, &self.retry, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => narrative::fallback_summary(value),
            Err(err) => {
                warn!(error = %err, "narrative generation failed, using summary");
                narrative::fallback_summary(value)
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        self.model.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingModel {
        seen: Mutex<Vec<CompletionOptions>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, _prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(options.clone());
            Ok("  Total sales were 260 BDT.  ".to_string())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_narrative_request_uses_its_own_system_prompt_and_token_cap() {
        let model = Arc::new(RecordingModel { seen: Mutex::new(Vec::new()) });
        let config = SynthesisConfig::default();
        let synthesizer = ProgramSynthesizer::new(model.clone(), AllowList::standard(), &config)
            .with_retry_policy(RetryPolicy::immediate(0));
        let value = ResultValue::Scalar { label: "total_sales".into(), value: json!(260.0) };

        let text = synthesizer
            .render_narrative("What was total sales?", Some("no placeholder"), &value, "Be brief.")
            .await;
        assert_eq!(text, "Total sales were 260 BDT.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system.as_deref(), Some(prompts::NARRATIVE_SYSTEM_PROMPT));
        assert_eq!(seen[0].max_tokens, NARRATIVE_MAX_TOKENS.min(config.max_tokens));
        assert_eq!(seen[0].temperature, config.temperature);
        assert_eq!(synthesizer.options.system.as_deref(), Some(prompts::SYNTHESIS_SYSTEM_PROMPT));
        assert_eq!(synthesizer.options.max_tokens, config.max_tokens);
    }
}
