//! Retry with exponential backoff for provider calls.

use super::{CompletionOptions, LanguageModel, ProviderError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms = (self.initial_delay.as_millis() as f64)
            * (self.backoff_multiplier.powi(attempt as i32));
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retries are used up. The last error is returned as is.
    pub async fn retry<F, Fut, T, E>(
        &self,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
        retry_hint: impl Fn(&E) -> Option<Duration>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) || attempt >= self.max_retries {
                        return Err(err);
                    }
                    let delay = retry_hint(&err)
                        .map(|hint| hint.min(self.max_delay))
                        .unwrap_or_else(|| self.delay_for_attempt(attempt));
                    warn!(
                        "Provider call failed (attempt {} of {}): {}; retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// One completion with per-call timeout and transient-failure retries.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    options: &CompletionOptions,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<String, ProviderError> {
    policy
        .retry(
            || async {
                match tokio::time::timeout(timeout, model.complete(prompt, options)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(timeout)),
                }
            },
            ProviderError::is_retryable,
            |err| match err {
                ProviderError::RateLimited { retry_after } => *retry_after,
                _ => None,
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result = RetryPolicy::immediate(3)
            .retry(
                move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err::<u32, _>("temporary".to_string())
                        } else {
                            Ok(7)
                        }
                    }
                },
                |_| true,
                |_| None,
            )
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result = RetryPolicy::immediate(3)
            .retry(
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(ProviderError::Auth("nope".into()))
                    }
                },
                ProviderError::is_retryable,
                |_| None,
            )
            .await;
        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let result = RetryPolicy::immediate(2)
            .retry(
                || async { Err::<(), _>(ProviderError::Network("down".into())) },
                ProviderError::is_retryable,
                |_| None,
            )
            .await;
        assert_eq!(result, Err(ProviderError::Network("down".into())));
    }
}
