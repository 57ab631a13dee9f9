//! Task Execution Module
//!
//! The [`Executor`] renders a task, sends the rendered text to a completion
//! service and retries transient failures with backoff. A timeout bounds
//! the whole attempt loop, including backoff sleeps.

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};

use crate::error::ExecutorError;
use crate::task::{Input, Rendered, Task};
use llm::{CompletionRequest, CompletionService, TokenUsage};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tooling::async_utils::backoff::BackoffPolicy;
use tooling::async_utils::timeout::{interruptible, Interrupted};
use tracing::{debug, info};

/// Model used when neither the request nor the executor names one
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// One task execution
#[derive(Clone)]
pub struct ExecuteRequest {
    pub task: Arc<dyn Task>,
    pub input: Input,

    /// Overrides the executor's default model
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,

    /// Bounds the whole execution; `None` or zero uses the executor's base timeout
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    /// Execute `task` with `input`
    pub fn new(task: Arc<dyn Task>, input: Input) -> Self {
        Self {
            task,
            input,
            model: None,
            temperature: 0.0,
            max_tokens: None,
            stop: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Same options, different task
    pub fn with_task(mut self, task: Arc<dyn Task>) -> Self {
        self.task = task;
        self
    }
}

/// Successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteResult {
    pub content: String,
    pub usage: TokenUsage,

    /// Model reported by the service
    pub model: String,
    pub rendered: Rendered,

    /// 1-based index of the attempt that succeeded
    pub attempts: u32,
}

/// Renders tasks and runs them against a completion service
///
/// # Example
///
/// ```rust,ignore
/// use orchestrator::{Executor, ExecuteRequest};
/// use tooling::async_utils::backoff::BackoffPolicy;
///
/// let executor = Executor::new(service)
///     .with_retry(2, BackoffPolicy::default())
///     .with_timeout(Duration::from_secs(30));
///
/// let result = executor
///     .execute(&cancel, ExecuteRequest::new(task, input))
///     .await?;
/// println!("{} (after {} attempts)", result.content, result.attempts);
/// ```
pub struct Executor {
    service: Arc<dyn CompletionService>,
    retry: RetryPolicy,
    base_timeout: Option<Duration>,
    default_model: String,
}

impl Executor {
    /// No retries, exponential backoff (500ms doubling, 30s cap) once
    /// retries are enabled, no timeout
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            retry: RetryPolicy::new(0, BackoffPolicy::default()),
            base_timeout: None,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Set max retries and backoff
    pub fn with_retry(mut self, max_retries: u32, backoff: BackoffPolicy) -> Self {
        self.retry = RetryPolicy::new(max_retries, backoff);
        self
    }

    /// Set the timeout used when a request has none; zero means unbounded
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn base_timeout(&self) -> Option<Duration> {
        self.base_timeout
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn service(&self) -> &Arc<dyn CompletionService> {
        &self.service
    }

    /// Effective timeout for a request-level override
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.filter(|t| !t.is_zero()).or(self.base_timeout)
    }

    /// Render, then call the service with retry, backoff and timeout
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: ExecuteRequest,
    ) -> Result<ExecuteResult, ExecutorError> {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled { attempts: 0 });
        }

        // Rendering sits outside the timeout but still yields to cancellation
        let rendered = match interruptible(None, cancel, request.task.render(&request.input)).await {
            Ok(rendered) => rendered?,
            Err(_) => return Err(ExecutorError::Cancelled { attempts: 0 }),
        };
        let timeout = self.effective_timeout(request.timeout);
        let attempts = AtomicU32::new(0);

        let work = self.complete_rendered(cancel, &request, rendered, &self.retry, &attempts);
        bounded(timeout, cancel, &attempts, work).await
    }

    /// Render and attempt without applying any timeout
    ///
    /// `attempts` accumulates across calls that share it.
    pub(crate) async fn run_unbounded(
        &self,
        cancel: &CancellationToken,
        request: &ExecuteRequest,
        retry: &RetryPolicy,
        attempts: &AtomicU32,
    ) -> Result<ExecuteResult, ExecutorError> {
        let rendered = request.task.render(&request.input).await?;
        self.complete_rendered(cancel, request, rendered, retry, attempts)
            .await
    }

    async fn complete_rendered(
        &self,
        cancel: &CancellationToken,
        request: &ExecuteRequest,
        rendered: Rendered,
        retry: &RetryPolicy,
        attempts: &AtomicU32,
    ) -> Result<ExecuteResult, ExecutorError> {
        let completion = self.completion_request(request, &rendered);
        let task_name = request.task.name();
        debug!(task = task_name, model = %completion.model, "executing task");

        let response = retry_with_backoff(retry, task_name, cancel, attempts, || {
            self.service.complete(cancel, completion.clone())
        })
        .await?;

        let used = attempts.load(Ordering::SeqCst);
        info!(
            task = task_name,
            model = %response.model,
            attempts = used,
            total_tokens = response.usage.total_tokens,
            "task executed"
        );

        Ok(ExecuteResult {
            content: response.content,
            usage: response.usage,
            model: response.model,
            rendered,
            attempts: used,
        })
    }

    fn completion_request(&self, request: &ExecuteRequest, rendered: &Rendered) -> CompletionRequest {
        let model = request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);

        CompletionRequest {
            user: rendered.user.clone(),
            system: rendered.system.clone(),
            model: model.to_string(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stop: request.stop.clone(),
            metadata: request.task.metadata(),
        }
    }
}

/// Run `work` under an optional timeout, translating interruptions
pub(crate) async fn bounded<F, T>(
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    attempts: &AtomicU32,
    work: F,
) -> Result<T, ExecutorError>
where
    F: std::future::Future<Output = Result<T, ExecutorError>>,
{
    match interruptible(timeout, cancel, work).await {
        Ok(result) => result,
        Err(Interrupted::TimedOut(timeout)) => Err(ExecutorError::Timeout {
            timeout,
            attempts: attempts.load(Ordering::SeqCst),
        }),
        Err(Interrupted::Cancelled) => Err(ExecutorError::Cancelled {
            attempts: attempts.load(Ordering::SeqCst),
        }),
    }
}
