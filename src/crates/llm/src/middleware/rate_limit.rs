//! Admission control for `complete`.

use super::Middleware;
use crate::error::{LlmError, Result};
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tooling::rate_limit::RateLimiter;

/// Admits at most `limit` `complete` calls per window.
///
/// Calls wait for a permit. A cancelled wait returns
/// [`LlmError::RateLimitCancelled`] and consumes nothing.
pub struct RateLimitedService {
    inner: Arc<dyn CompletionService>,
    limiter: RateLimiter,
}

impl RateLimitedService {
    /// Wrap `inner` with a fresh limiter.
    pub fn new(inner: Arc<dyn CompletionService>, limit: usize, window: Duration) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(limit, window),
        }
    }

    /// The underlying permit pool.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Rate limiting layer, e.g. `rate_limit(100, Duration::from_secs(60))`.
pub fn rate_limit(limit: usize, window: Duration) -> Middleware {
    Box::new(move |inner| Arc::new(RateLimitedService::new(inner, limit, window)))
}

#[async_trait]
impl CompletionService for RateLimitedService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| LlmError::RateLimitCancelled)?;
        self.inner.complete(cancel, request).await
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        self.inner.stream(cancel, request).await
    }

    fn model_info(&self, model: &str) -> Result<ModelInfo> {
        self.inner.model_info(model)
    }
}
