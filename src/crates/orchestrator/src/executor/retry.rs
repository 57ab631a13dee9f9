//! Retry Logic for Completion Calls
//!
//! Runs an operation up to `max_retries + 1` times, sleeping between
//! attempts according to a [`BackoffPolicy`]. Only errors the service
//! marks as retryable are retried; cancellation is observed during every
//! backoff sleep.

use crate::error::ExecutorError;
use llm::LlmError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use tooling::async_utils::backoff::BackoffPolicy;
use tooling::async_utils::timeout::sleep_or_cancel;
use tracing::{debug, info, warn};

/// How many times to retry and how long to wait in between
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before retry `n` (0-based)
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(0, BackoffPolicy::none())
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Execute `operation` with retry logic
///
/// `attempts` is incremented before every call so callers that drop this
/// future (on timeout) can still report how far it got.
///
/// # Returns
/// The first success, or the error that stopped the loop
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    attempts: &AtomicU32,
    mut operation: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled {
                attempts: attempts.load(Ordering::SeqCst),
            });
        }

        let made = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > 0 {
            info!(
                operation = operation_name,
                attempt = made,
                max_attempts = policy.max_attempts(),
                "Retrying operation"
            );
        }

        let err = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt = made, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => err,
        };

        debug!(operation = operation_name, attempt = made, error = %err, "Operation failed");

        if err.is_cancellation() {
            return Err(ExecutorError::Cancelled { attempts: made });
        }
        if !err.is_retryable() {
            warn!(operation = operation_name, error = %err, "Permanent error, aborting retries");
            return Err(ExecutorError::Service {
                attempts: made,
                source: err,
            });
        }
        if attempt.saturating_add(1) >= policy.max_attempts() {
            warn!(
                operation = operation_name,
                attempts = made,
                error = %err,
                "All retry attempts exhausted"
            );
            return Err(ExecutorError::Service {
                attempts: made,
                source: err,
            });
        }

        let delay = policy.backoff.delay(attempt);
        debug!(
            operation = operation_name,
            attempt = made,
            delay_ms = delay.as_millis() as u64,
            "Transient error, will retry after delay"
        );
        if sleep_or_cancel(delay, cancel).await.is_err() {
            return Err(ExecutorError::Cancelled { attempts: made });
        }
        attempt += 1;
    }
}
