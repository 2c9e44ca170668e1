//! Per-call retries with capped exponential backoff.
//!
//! Adapters never retry on their own; callers that want resilience (the
//! migration engine) wrap individual adapter calls in a [`RetryExecutor`].

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use stowage_common::{Error, Result};

/// Backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Spread delays by +/-25%.
    pub jitter: bool,
}

impl RetryConfig {
    /// Policy allowing `max_retries` retries with default timing.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set the first delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Toggle jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let growth = self
            .backoff_multiplier
            .max(1.0)
            .powi(retry.min(i32::MAX as u32) as i32);
        let uncapped = self.initial_delay.as_secs_f64() * growth;
        let capped = Duration::from_secs_f64(uncapped.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            capped.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        } else {
            capped
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Runs a fallible async operation under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying transient failures (network, I/O, worker
    /// timeout). The error of the last attempt is returned.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_condition(operation, Error::is_transient)
            .await
    }

    /// Run `operation`, retrying failures accepted by `should_retry`.
    pub async fn execute_with_condition<F, Fut, T, C>(
        &self,
        operation: F,
        should_retry: C,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
    {
        let mut retries = 0;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "Succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if retries >= self.config.max_retries || !should_retry(&err) {
                if retries > 0 {
                    warn!(attempts = retries + 1, error = %err, "Giving up");
                }
                return Err(err);
            }

            let delay = self.config.delay_for_attempt(retries);
            retries += 1;
            warn!(retry = retries, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
