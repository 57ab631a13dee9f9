//! Request/response logging through `tracing`.

use super::Middleware;
use crate::error::Result;
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tooling::logging::{format_duration, sanitize_for_logging, truncate_for_log};

const PREVIEW_CHARS: usize = 80;

/// Logs every `complete` call. Never changes results or errors.
pub struct LoggingService {
    inner: Arc<dyn CompletionService>,
}

impl LoggingService {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        Self { inner }
    }
}

/// Layer that logs model and input size before the call, usage or error after.
pub fn logging() -> Middleware {
    Box::new(|inner| Arc::new(LoggingService::new(inner)))
}

#[async_trait]
impl CompletionService for LoggingService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        let model = request.model.clone();
        tracing::debug!(
            model = %model,
            input_len = request.input_len(),
            preview = %sanitize_for_logging(&truncate_for_log(&request.user, PREVIEW_CHARS)),
            "completion request"
        );

        let started = Instant::now();
        let result = self.inner.complete(cancel, request).await;
        let elapsed = format_duration(started.elapsed());

        match &result {
            Ok(response) => tracing::info!(
                model = %model,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                elapsed = %elapsed,
                "completion ok"
            ),
            Err(e) => tracing::warn!(model = %model, elapsed = %elapsed, error = %e, "completion failed"),
        }

        result
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::testing::ScriptedService;

    #[tokio::test]
    async fn test_logging_is_transparent() {
        let inner = Arc::new(
            ScriptedService::new()
                .then_ok("first")
                .then_err(LlmError::InvalidRequest("bad".into())),
        );
        let service = logging()(inner.clone());
        let cancel = CancellationToken::new();

        let ok = service
            .complete(&cancel, CompletionRequest::new("m", "hi"))
            .await
            .unwrap();
        assert_eq!(ok.content, "first");

        let err = service
            .complete(&cancel, CompletionRequest::new("m", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert_eq!(inner.calls(), 2);
    }
}
