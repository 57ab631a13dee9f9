//! Completion service boundary for loom.
//!
//! This crate defines the [`CompletionService`] capability that every backend
//! implements, the request/response types that cross it, and a stack of
//! middleware layers that add resilience and observability around it.
//!
//! # Middleware
//!
//! Each layer wraps an inner service and implements the same trait:
//! - **Logging** - model, input size, usage and errors through `tracing`
//! - **Metrics** - request, error and token counters
//! - **Cache** - memoizes `complete` by (model, system, user)
//! - **Rate limit** - at most N calls per window
//! - **Circuit breaker** - fails fast while the service is unhealthy
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::middleware::{self, InMemoryCache};
//! use llm::{CompletionRequest, CompletionService};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (metrics, counters) = middleware::metrics();
//!     let service = middleware::chain(
//!         Arc::new(MyBackend::new()),
//!         vec![
//!             middleware::logging(),
//!             metrics,
//!             middleware::cache(Arc::new(InMemoryCache::new()), None),
//!             middleware::circuit_breaker(0.5, Duration::from_secs(30)),
//!         ],
//!     );
//!
//!     let cancel = CancellationToken::new();
//!     let response = service
//!         .complete(&cancel, CompletionRequest::new("gpt-4", "What is Rust?"))
//!         .await?;
//!     println!("{} ({} requests so far)", response.content, counters.requests());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod middleware;
pub mod service;
pub mod stream;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use config::{MiddlewareConfig, ServiceStack};
pub use error::{LlmError, Result};
pub use service::{CompletionService, CompletionStream};
pub use stream::{collect_stream, stream_to_writer};
pub use types::{CompletionRequest, CompletionResponse, ModelInfo, StreamChunk, TokenUsage};
