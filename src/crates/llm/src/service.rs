//! The completion service capability.
//!
//! Every concrete backend and every middleware layer implements
//! [`CompletionService`], so layers compose by nesting `Arc<dyn CompletionService>`.

use crate::error::Result;
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo, StreamChunk};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Stream of completion chunks.
///
/// An `Err` item ends the stream as far as consumers are concerned.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A service that turns a rendered request into generated content.
///
/// # Example
///
/// ```rust,ignore
/// use llm::{CompletionRequest, CompletionService};
/// use tokio_util::sync::CancellationToken;
///
/// let cancel = CancellationToken::new();
/// let request = CompletionRequest::new("gpt-4", "What is Rust?");
/// let response = service.complete(&cancel, request).await?;
/// println!("{}", response.content);
/// ```
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce a complete response.
    ///
    /// Implementations must return [`LlmError::Cancelled`](crate::LlmError::Cancelled)
    /// promptly once `cancel` fires.
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse>;

    /// Produce the response incrementally.
    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionStream>;

    /// Describe a model served by this service.
    fn model_info(&self, model: &str) -> Result<ModelInfo>;
}
