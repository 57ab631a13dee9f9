//! Async utilities for common async patterns
//!
//! This module provides utilities for working with async operations:
//! - Backoff policies mapping an attempt index to a wait duration
//! - Deadlines and cancellation-aware sleeps and timeouts
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::backoff::BackoffPolicy;
//! use tooling::async_utils::timeout::{interruptible, sleep_or_cancel};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! async fn call_with_retry(cancel: &CancellationToken) -> Result<String, String> {
//!     let backoff = BackoffPolicy::exponential(
//!         Duration::from_millis(100),
//!         Duration::from_secs(5),
//!     );
//!
//!     interruptible(Some(Duration::from_secs(30)), cancel, async {
//!         for attempt in 0..3 {
//!             if let Ok(value) = do_call().await {
//!                 return Ok(value);
//!             }
//!             sleep_or_cancel(backoff.delay(attempt), cancel).await.ok();
//!         }
//!         Err("exhausted".to_string())
//!     })
//!     .await
//!     .map_err(|e| e.to_string())?
//! }
//! ```

pub mod backoff;
pub mod timeout;
