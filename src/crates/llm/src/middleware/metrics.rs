//! Request, error and token counters.

use super::Middleware;
use crate::error::Result;
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

/// Read handle onto the counters of a [`MetricsService`].
///
/// Reads never block and may trail calls that are still in flight.
#[derive(Debug, Clone, Default)]
pub struct MetricsCounters {
    counters: Arc<Counters>,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl MetricsCounters {
    /// Total `complete` calls.
    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::Relaxed)
    }

    /// Calls that returned an error.
    pub fn errors(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    /// Prompt tokens across successful calls.
    pub fn prompt_tokens(&self) -> u64 {
        self.counters.prompt_tokens.load(Ordering::Relaxed)
    }

    /// Completion tokens across successful calls.
    pub fn completion_tokens(&self) -> u64 {
        self.counters.completion_tokens.load(Ordering::Relaxed)
    }

    /// All four totals at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests(),
            errors: self.errors(),
            prompt_tokens: self.prompt_tokens(),
            completion_tokens: self.completion_tokens(),
        }
    }
}

/// Counts requests, errors and token usage of the wrapped service.
pub struct MetricsService {
    inner: Arc<dyn CompletionService>,
    counters: Arc<Counters>,
}

impl MetricsService {
    /// Wrap `inner`, returning the service and its read handle.
    pub fn new(inner: Arc<dyn CompletionService>) -> (Self, MetricsCounters) {
        let handle = MetricsCounters::default();
        let service = Self {
            inner,
            counters: handle.counters.clone(),
        };
        (service, handle)
    }
}

/// Metrics layer plus the handle for reading its totals.
pub fn metrics() -> (Middleware, MetricsCounters) {
    let handle = MetricsCounters::default();
    let counters = handle.counters.clone();
    let middleware: Middleware = Box::new(move |inner| Arc::new(MetricsService { inner, counters }));
    (middleware, handle)
}

#[async_trait]
impl CompletionService for MetricsService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.inner.complete(cancel, request).await;
        match &result {
            Ok(response) => {
                self.counters
                    .prompt_tokens
                    .fetch_add(u64::from(response.usage.prompt_tokens), Ordering::Relaxed);
                self.counters
                    .completion_tokens
                    .fetch_add(u64::from(response.usage.completion_tokens), Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
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
