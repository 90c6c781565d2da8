//! Bounded retry with exponential backoff for transient provider failures.
//!
//! [`Retrying`] wraps any [`Inference`] and retries errors whose
//! [`ProviderError::is_transient`] is true (429, 5xx, timeouts, transport).
//! Bad requests and auth failures surface immediately. The run loop itself
//! never retries.

use super::{Completion, Inference, InferenceFuture, InferenceRequest};
use crate::error::ProviderError;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// An [`Inference`] that retries transient failures of the inner one.
#[derive(Debug)]
pub struct Retrying<I> {
    inner: I,
    config: RetryConfig,
}

impl<I: Inference> Retrying<I> {
    pub fn new(inner: I, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    async fn call(&self, request: InferenceRequest<'_>) -> Result<Completion, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.infer(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < self.config.max_retries && e.is_transient() => {
                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        "Transient API error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                        attempt + 1,
                        self.config.max_retries,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<I: Inference> Inference for Retrying<I> {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a> {
        Box::pin(self.call(request))
    }
}
