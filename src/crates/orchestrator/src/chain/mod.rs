//! Chain Orchestration
//!
//! A [`Chain`] runs an ordered list of nodes. A node is either one step or
//! a parallel group of steps. Each step's output is recorded in the
//! [`ChainResult`] under the step's name and merged into the input context
//! seen by later nodes, so templates can reference earlier outputs with
//! `{{step_name}}`.
//!
//! # Failure handling
//!
//! A step that still fails after its retries and fallback stops the chain.
//! The error comes back as a [`ChainFailure`] carrying every output
//! recorded before the failing node. A parallel group is all-or-nothing:
//! when any member fails none of the group's outputs are merged, siblings
//! still run to completion, and the reported failure is the first failing
//! step in declaration order.
//!
//! # Example
//!
//! ```rust,ignore
//! let chain = Chain::new("review")
//!     .with_executor(executor)
//!     .step("draft", draft_task, StepOptions::new().with_retries(2))
//!     .parallel(vec![
//!         Step::new("tone", tone_task),
//!         Step::new("facts", facts_task),
//!     ])
//!     .step("final", final_task, StepOptions::new());
//!
//! let result = chain.execute(&cancel, input).await?;
//! println!("{}", result.get("final").unwrap_or_default());
//! ```

mod result;
mod step;

pub use result::ChainResult;
pub use step::{Condition, Step, StepOptions};

use crate::error::{ChainError, ChainFailure, ExecutorError};
use crate::executor::{bounded, ExecuteRequest, Executor, RetryPolicy};
use crate::task::{Input, Task};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Node {
    Single(Step),
    Parallel(Vec<Step>),
}

impl Node {
    fn steps(&self) -> &[Step] {
        match self {
            Node::Single(step) => std::slice::from_ref(step),
            Node::Parallel(steps) => steps,
        }
    }
}

/// An ordered composition of steps and parallel groups
#[derive(Clone)]
pub struct Chain {
    name: String,
    nodes: Vec<Node>,
    executor: Option<Arc<Executor>>,
    default_model: Option<String>,
}

/// Everything a step needs to run on its own task
#[derive(Clone)]
struct StepRunner {
    executor: Option<Arc<Executor>>,
    default_model: Option<String>,
    context: Arc<Input>,
    cancel: CancellationToken,
}

impl Chain {
    /// Empty chain; without an executor steps only render
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            executor: None,
            default_model: None,
        }
    }

    pub fn with_executor(mut self, executor: impl Into<Arc<Executor>>) -> Self {
        self.executor = Some(executor.into());
        self
    }

    /// Model for every step, overriding the executor's default
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Append a sequential step
    pub fn step(
        mut self,
        name: impl Into<String>,
        task: Arc<dyn Task>,
        options: StepOptions,
    ) -> Self {
        self.nodes
            .push(Node::Single(Step::new(name, task).with_options(options)));
        self
    }

    /// Append a prepared step
    pub fn then(mut self, step: Step) -> Self {
        self.nodes.push(Node::Single(step));
        self
    }

    /// Append a group of steps that run concurrently
    pub fn parallel(mut self, steps: Vec<Step>) -> Self {
        self.nodes.push(Node::Parallel(steps));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes (a parallel group counts once)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every step name in declaration order
    pub fn step_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .flat_map(|node| node.steps())
            .map(|step| step.name.as_str())
            .collect()
    }

    fn check_names(&self) -> Result<(), ChainError> {
        let mut seen = HashSet::new();
        for name in self.step_names() {
            if !seen.insert(name) {
                return Err(ChainError::DuplicateStep(name.to_string()));
            }
        }
        Ok(())
    }

    /// Run every node in order
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        input: Input,
    ) -> Result<ChainResult, ChainFailure> {
        let mut result = ChainResult::new();
        if let Err(err) = self.check_names() {
            return Err(ChainFailure::new(result, err));
        }

        let span = info_span!("chain", chain = %self.name, execution_id = %Uuid::new_v4());
        let mut context = input;

        async {
            info!(nodes = self.nodes.len(), "chain started");

            for (index, node) in self.nodes.iter().enumerate() {
                if cancel.is_cancelled() {
                    warn!(node = index, "chain cancelled");
                    return Err(ChainFailure::new(result, ChainError::Cancelled));
                }

                let runner = StepRunner {
                    executor: self.executor.clone(),
                    default_model: self.default_model.clone(),
                    context: Arc::new(context.clone()),
                    cancel: cancel.clone(),
                };

                let outcome = match node {
                    Node::Single(step) => run_single(&runner, step, &result).await,
                    Node::Parallel(steps) => run_group(&runner, steps, &result).await,
                };

                match outcome {
                    Ok(outputs) => {
                        for (name, output) in outputs {
                            context.insert(name.clone(), Value::String(output.clone()));
                            result.insert(name, output);
                        }
                    }
                    Err(err) => {
                        warn!(node = index, error = %err, "chain failed");
                        return Err(ChainFailure::new(result, err));
                    }
                }
            }

            info!(outputs = result.len(), "chain completed");
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

async fn run_single(
    runner: &StepRunner,
    step: &Step,
    result: &ChainResult,
) -> Result<Vec<(String, String)>, ChainError> {
    if !step.should_run(result) {
        debug!(step = %step.name, "condition not met, skipping step");
        return Ok(Vec::new());
    }
    let output = runner.clone().run(step.clone()).await?;
    Ok(vec![(step.name.clone(), output)])
}

async fn run_group(
    runner: &StepRunner,
    steps: &[Step],
    result: &ChainResult,
) -> Result<Vec<(String, String)>, ChainError> {
    let launched: Vec<Step> = steps
        .iter()
        .filter(|step| {
            let run = step.should_run(result);
            if !run {
                debug!(step = %step.name, "condition not met, skipping step");
            }
            run
        })
        .cloned()
        .collect();

    debug!(steps = launched.len(), "starting parallel group");

    let handles = launched.iter().map(|step| {
        let runner = runner.clone();
        let step = step.clone();
        tokio::spawn(async move { runner.run(step).await }.in_current_span())
    });
    let joined = join_all(handles).await;

    let mut outputs = Vec::with_capacity(launched.len());
    let mut first_error = None;
    for (step, joined) in launched.iter().zip(joined) {
        let outcome = joined.unwrap_or_else(|join_err| {
            Err(ChainError::Panicked {
                step: step.name.clone(),
                message: join_err.to_string(),
            })
        });
        match outcome {
            Ok(output) => outputs.push((step.name.clone(), output)),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

impl StepRunner {
    async fn run(self, step: Step) -> Result<String, ChainError> {
        let span = info_span!("step", step = %step.name);
        let name = step.name.clone();

        let outcome = async {
            debug!(task = step.task.name(), "step started");
            let attempts = AtomicU32::new(0);
            let work = self.primary_then_fallback(&step, &attempts);
            bounded(self.timeout(&step), &self.cancel, &attempts, work).await
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(output) => {
                info!(step = %name, "step completed");
                Ok(output)
            }
            Err(ExecutorError::Cancelled { .. }) => Err(ChainError::Cancelled),
            Err(source) => Err(ChainError::Step { step: name, source }),
        }
    }

    /// Step timeout, else the executor's base timeout
    fn timeout(&self, step: &Step) -> Option<Duration> {
        match &self.executor {
            Some(executor) => executor.effective_timeout(step.options.timeout),
            None => step.options.timeout.filter(|t| !t.is_zero()),
        }
    }

    fn retry_policy(&self, step: &Step) -> RetryPolicy {
        let base = self
            .executor
            .as_ref()
            .map(|executor| executor.retry_policy().clone())
            .unwrap_or_else(RetryPolicy::no_retry);

        RetryPolicy::new(
            step.options.max_retries.unwrap_or(base.max_retries),
            step.options.backoff.clone().unwrap_or(base.backoff),
        )
    }

    async fn primary_then_fallback(
        &self,
        step: &Step,
        attempts: &AtomicU32,
    ) -> Result<String, ExecutorError> {
        let primary = self
            .attempt(&step.task, &self.retry_policy(step), attempts)
            .await;

        let err = match primary {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };
        let fallback = match &step.options.fallback {
            Some(fallback) if err.allows_fallback() => fallback,
            _ => return Err(err),
        };

        warn!(error = %err, fallback = fallback.name(), "primary task failed, trying fallback");
        match self
            .attempt(fallback, &RetryPolicy::no_retry(), attempts)
            .await
        {
            Ok(output) => {
                info!(fallback = fallback.name(), "fallback succeeded");
                Ok(output)
            }
            Err(cancelled @ ExecutorError::Cancelled { .. }) => Err(cancelled),
            Err(fallback_err) => {
                warn!(error = %fallback_err, "fallback failed, reporting primary error");
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        task: &Arc<dyn Task>,
        retry: &RetryPolicy,
        attempts: &AtomicU32,
    ) -> Result<String, ExecutorError> {
        let executor = match &self.executor {
            Some(executor) => executor,
            None => {
                let rendered = task.render(&self.context).await?;
                return Ok(rendered.user);
            }
        };

        let mut request = ExecuteRequest::new(task.clone(), Input::clone(&self.context));
        if let Some(model) = &self.default_model {
            request = request.with_model(model.clone());
        }

        let result = executor
            .run_unbounded(&self.cancel, &request, retry, attempts)
            .await?;
        Ok(result.content)
    }
}
