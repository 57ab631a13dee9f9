//! In-process completion services for tests and demos.
//!
//! Both services count calls atomically, honour cancellation during their
//! simulated latency, and can be shared across tasks behind an `Arc`.

use crate::cost::{SimpleCounter, TokenCounter};
use crate::error::{LlmError, Result};
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo, StreamChunk, TokenUsage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tooling::async_utils::timeout::sleep_or_cancel;

/// Context size reported by the test services.
pub const TEST_CONTEXT_SIZE: u32 = 8192;

#[derive(Debug, Clone)]
enum Reply {
    Content(String),
    Response(CompletionResponse),
    Error(LlmError),
}

fn estimated_usage(request: &CompletionRequest, content: &str) -> TokenUsage {
    let counter = SimpleCounter;
    TokenUsage::new(
        counter.count_tokens(&request.system) + counter.count_tokens(&request.user),
        counter.count_tokens(content),
    )
}

fn into_stream(response: CompletionResponse) -> CompletionStream {
    let mut chunks: Vec<Result<StreamChunk>> = response
        .content
        .split_inclusive(' ')
        .map(|piece| Ok(StreamChunk::delta(piece)))
        .collect();
    chunks.push(Ok(StreamChunk::done(Some(response.usage))));
    Box::pin(futures::stream::iter(chunks))
}

async fn simulate_latency(latency: Duration, cancel: &CancellationToken) -> Result<()> {
    sleep_or_cancel(latency, cancel)
        .await
        .map_err(|_| LlmError::Cancelled)
}

/// Replays queued replies in order, then a fixed reply forever.
///
/// # Example
///
/// ```rust
/// use llm::testing::ScriptedService;
/// use llm::LlmError;
///
/// let service = ScriptedService::new()
///     .then_err(LlmError::Service("overloaded".into()))
///     .then_err(LlmError::Service("overloaded".into()))
///     .always_ok("ok");
/// assert_eq!(service.calls(), 0);
/// ```
#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    latency: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    /// A service with an empty script. Calls fail once the script runs out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply with `content`.
    pub fn then_ok(self, content: impl Into<String>) -> Self {
        self.then(Reply::Content(content.into()))
    }

    /// Queue a full response.
    pub fn then_response(self, response: CompletionResponse) -> Self {
        self.then(Reply::Response(response))
    }

    /// Queue an error.
    pub fn then_err(self, error: LlmError) -> Self {
        self.then(Reply::Error(error))
    }

    /// Reply with `content` once the script is exhausted.
    pub fn always_ok(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(Reply::Content(content.into()));
        self
    }

    /// Fail with `error` once the script is exhausted.
    pub fn always_err(mut self, error: LlmError) -> Self {
        self.fallback = Some(Reply::Error(error));
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn then(self, reply: Reply) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Calls to `complete` or `stream` so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    async fn respond(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        simulate_latency(self.latency, cancel).await?;

        let reply = self.script.lock().pop_front().or_else(|| self.fallback.clone());
        match reply {
            Some(Reply::Content(content)) => {
                let usage = estimated_usage(&request, &content);
                Ok(CompletionResponse::new(content, request.model)
                    .with_usage(usage)
                    .with_finish_reason("stop"))
            }
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(error)) => Err(error),
            None => Err(LlmError::Other("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.respond(cancel, request).await
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        self.respond(cancel, request).await.map(into_stream)
    }

    fn model_info(&self, model: &str) -> Result<ModelInfo> {
        Ok(ModelInfo::new(model, TEST_CONTEXT_SIZE, true))
    }
}

/// One `complete` call observed by an [`EchoService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub user: String,
    pub model: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Replies with the request's user text.
///
/// Requests whose user text contains a registered needle can be delayed
/// or failed, which lets one service drive many differently-behaving steps.
#[derive(Default)]
pub struct EchoService {
    latency: Duration,
    delays: Vec<(String, Duration)>,
    failures: Vec<(String, LlmError)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    log: Mutex<Vec<CallRecord>>,
}

impl EchoService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay requests containing `needle` by `delay` instead of the base latency.
    pub fn delay_on(mut self, needle: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((needle.into(), delay));
        self
    }

    /// Fail requests containing `needle` with `error`.
    pub fn fail_on(mut self, needle: impl Into<String>, error: LlmError) -> Self {
        self.failures.push((needle.into(), error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Finished calls, in completion order.
    pub fn log(&self) -> Vec<CallRecord> {
        self.log.lock().clone()
    }

    /// The record for the first call whose user text equals `user`.
    pub fn record_for(&self, user: &str) -> Option<CallRecord> {
        self.log.lock().iter().find(|r| r.user == user).cloned()
    }

    async fn respond(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = self
            .delays
            .iter()
            .find(|(needle, _)| request.user.contains(needle.as_str()))
            .map(|(_, delay)| *delay)
            .unwrap_or(self.latency);
        let waited = simulate_latency(latency, cancel).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        waited?;

        self.log.lock().push(CallRecord {
            user: request.user.clone(),
            model: request.model.clone(),
            started,
            finished: Instant::now(),
        });

        if let Some((_, error)) = self
            .failures
            .iter()
            .find(|(needle, _)| request.user.contains(needle.as_str()))
        {
            return Err(error.clone());
        }

        let usage = estimated_usage(&request, &request.user);
        Ok(CompletionResponse::new(request.user, request.model)
            .with_usage(usage)
            .with_finish_reason("stop"))
    }
}

#[async_trait]
impl CompletionService for EchoService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.respond(cancel, request).await
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        self.respond(cancel, request).await.map(into_stream)
    }

    fn model_info(&self, model: &str) -> Result<ModelInfo> {
        Ok(ModelInfo::new(model, TEST_CONTEXT_SIZE, true))
    }
}
