//! Step definitions

use super::ChainResult;
use crate::task::Task;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tooling::async_utils::backoff::BackoffPolicy;

/// Predicate deciding whether a step runs, given the outputs so far
pub type Condition = Arc<dyn Fn(&ChainResult) -> bool + Send + Sync>;

/// Per-step overrides. Unset fields fall back to the chain's executor.
#[derive(Clone, Default)]
pub struct StepOptions {
    pub max_retries: Option<u32>,
    pub backoff: Option<BackoffPolicy>,

    /// Bounds the primary attempts and the fallback together
    pub timeout: Option<Duration>,

    /// Tried once after the primary task fails to render or exhausts retries
    pub fallback: Option<Arc<dyn Task>>,

    pub condition: Option<Condition>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Task>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Run the step only when `condition` holds for the outputs so far
    ///
    /// ```rust
    /// use orchestrator::StepOptions;
    ///
    /// let options = StepOptions::new().with_condition(|result| result.contains("draft"));
    /// assert!(options.condition.is_some());
    /// ```
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ChainResult) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }
}

impl fmt::Debug for StepOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOptions")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback.as_ref().map(|t| t.name().to_string()))
            .field("condition", &self.condition.is_some())
            .finish()
    }
}

/// A named task inside a chain
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub task: Arc<dyn Task>,
    pub options: StepOptions,
}

impl Step {
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            task,
            options: StepOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether the step should run against `result`
    pub fn should_run(&self, result: &ChainResult) -> bool {
        self.options
            .condition
            .as_ref()
            .map_or(true, |condition| condition(result))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("task", &self.task.name())
            .field("options", &self.options)
            .finish()
    }
}
