//! Error types for completion services and their middleware.

use std::time::Duration;
use thiserror::Error;

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when calling a completion service.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transient failure reported by the service (overload, 5xx, dropped connection).
    #[error("Service error: {0}")]
    Service(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found or unavailable.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The service gave up on the request before producing a response.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The caller's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// A circuit breaker rejected the call without reaching the service.
    #[error("Circuit breaker open: deadline exceeded, retry in {retry_after:?}")]
    CircuitOpen {
        /// Time left until the breaker admits a trial request.
        retry_after: Duration,
    },

    /// Cancelled while waiting for a rate limit permit.
    #[error("Rate limit wait cancelled")]
    RateLimitCancelled,

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Check if this error is retryable.
    ///
    /// Only transient service failures and service-side timeouts are worth
    /// another attempt. Cancellation, open circuits and malformed requests
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Service(_) | LlmError::Timeout(_))
    }

    /// Check if this error was caused by caller cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LlmError::Cancelled | LlmError::RateLimitCancelled)
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
