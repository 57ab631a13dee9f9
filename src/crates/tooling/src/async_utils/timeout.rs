//! Timeout and cancellation utilities for async operations
//!
//! Provides a cancellation-aware sleep and a wrapper that races a future
//! against both a timeout and a [`CancellationToken`]. Cancellation always
//! wins over a timeout or a completion that becomes ready in the same poll.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why an interruptible operation did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The timeout elapsed first
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The cancellation token fired first
    #[error("operation cancelled")]
    Cancelled,
}

/// Error returned by [`sleep_or_cancel`] when the token fires mid-sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sleep cancelled")]
pub struct SleepCancelled;

/// Sleep for `delay`, returning early if `cancel` fires
///
/// A zero delay still observes an already-cancelled token.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::async_utils::timeout::sleep_or_cancel;
///
/// if sleep_or_cancel(backoff.delay(attempt), &cancel).await.is_err() {
///     return Err(MyError::Cancelled);
/// }
/// ```
pub async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
) -> std::result::Result<(), SleepCancelled> {
    if cancel.is_cancelled() {
        return Err(SleepCancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SleepCancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Run `operation` bounded by an optional timeout and a cancellation token
///
/// `None` or a zero timeout means unbounded. The future is dropped when the
/// timeout or cancellation fires, which interrupts whatever it was awaiting.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::async_utils::timeout::{interruptible, Interrupted};
///
/// match interruptible(Some(Duration::from_secs(5)), &cancel, slow_call()).await {
///     Ok(value) => println!("done: {value:?}"),
///     Err(Interrupted::TimedOut(d)) => println!("gave up after {d:?}"),
///     Err(Interrupted::Cancelled) => println!("cancelled"),
/// }
/// ```
pub async fn interruptible<F>(
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    operation: F,
) -> std::result::Result<F::Output, Interrupted>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }

    match timeout.filter(|t| !t.is_zero()) {
        Some(limit) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupted::Cancelled),
                result = tokio::time::timeout(limit, operation) => {
                    result.map_err(|_elapsed| Interrupted::TimedOut(limit))
                }
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupted::Cancelled),
                output = operation => Ok(output),
            }
        }
    }
}
