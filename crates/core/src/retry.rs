//! Bounded retry with backoff
//!
//! Every remote call site goes through [`retry_with_backoff`]: transient
//! failures are retried up to the attempt bound with sleeps from the
//! [`BackoffPolicy`], and only the aggregated failure is reported.

use std::future::Future;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::profile::RetryConfig;

/// Attempt bound plus delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per operation, first try included
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, BackoffPolicy::from_config(config))
    }

    /// Same bound, with backoff jitter seeded from `key`
    pub fn seeded_for(self, key: &str) -> Self {
        Self {
            backoff: self.backoff.seeded_for(key),
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Retry a fallible async operation with backoff
///
/// Errors for which `is_retryable` is false are returned immediately. Once
/// the attempt bound is reached, the result is a single
/// [`Error::RetryExhausted`] carrying every failed attempt in order.
///
/// # Example
/// ```ignore
/// let data = retry_with_backoff(
///     &policy,
///     "read logs/a.txt",
///     || client.read("logs/a.txt"),
///     Error::is_transient,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut errors = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    tracing::warn!(operation, attempts = attempt, error = %e, "Retry budget exhausted");
                    errors.push(e);
                    return Err(Error::RetryExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        errors,
                    });
                }

                let backoff = policy.backoff.wait(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );
                errors.push(e);

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
