//! Tooling utilities shared across the loom workspace
//!
//! This crate provides the runtime plumbing that the completion pipeline is
//! built on.
//!
//! # Modules
//!
//! - `async_utils` - Backoff policies, deadlines and cancellable sleeps
//! - `rate_limit` - Bounded permit pool with fixed-interval replenishment
//! - `config` - Configuration trait and environment variable loading
//! - `logging` - Tracing initialisation and log formatting helpers
//! - `serialization` - Stable digests for cache keys

pub mod async_utils;
pub mod config;
pub mod logging;
pub mod rate_limit;
pub mod serialization;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// General error with message
    #[error("Tooling error: {0}")]
    General(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
