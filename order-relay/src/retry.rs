//! Bounded linear retry for a single remote call.
//!
//! Every attempt runs under its own timeout; a hung attempt is treated like
//! any other failed attempt. Between attempts the caller waits a fixed delay
//! (no backoff growth, no jitter). Once the attempts are used up the error of
//! the last attempt is returned as-is.

use crate::config::ValidationError;
use crate::metrics_defs::UPSTREAM_ATTEMPTS;
use serde::Deserialize;
use shared::counter;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Fixed wait between two attempts
    pub delay_ms: u64,
    /// Upper bound for a single attempt
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            attempt_timeout_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::ZeroAttemptTimeout);
        }
        Ok(())
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` attempts failed.
///
/// `operation_name` is only used for logs and metric tags. A policy with zero
/// attempts still makes one attempt.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Elapsed> + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let (result, outcome) = match timeout(policy.attempt_timeout(), operation()).await {
            Ok(Ok(value)) => (Ok(value), "ok"),
            Ok(Err(error)) => (Err(error), "error"),
            Err(elapsed) => (Err(E::from(elapsed)), "timeout"),
        };
        counter!(UPSTREAM_ATTEMPTS, "operation" => operation_name, "outcome" => outcome)
            .increment(1);

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "Operation failed after all attempts"
                );
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_ms = policy.delay_ms,
                    "Operation failed, retrying after delay"
                );
                sleep(policy.delay()).await;
            }
        }
    }
}
