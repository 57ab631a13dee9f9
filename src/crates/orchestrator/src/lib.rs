//! Resilient task execution and multi-step chains for loom
//!
//! This crate turns [`Task`]s into completions and strings them together:
//!
//! - [`Executor`] renders one task and calls a completion service with
//!   retry, exponential backoff, a whole-execution timeout and cancellation.
//! - [`Chain`] runs steps in order, or concurrently inside parallel groups,
//!   with per-step retries, timeout, fallback task and run condition.
//! - [`PipelineConfig`] loads executor and middleware settings from YAML
//!   and the environment and assembles both.
//!
//! # Example
//!
//! ```rust,ignore
//! use orchestrator::{Chain, PipelineConfig, PromptTask, StepOptions};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tooling::logging::init_tracing("info");
//!
//!     let pipeline = PipelineConfig::from_file("loom.yaml")?.build(Arc::new(MyBackend::new()));
//!     let chain = Chain::new("blog")
//!         .with_executor(pipeline.executor.clone())
//!         .step("outline", Arc::new(PromptTask::new("outline", "Outline a post on {{topic}}")), StepOptions::new())
//!         .step("draft", Arc::new(PromptTask::new("draft", "Write it:\n{{outline}}")), StepOptions::new().with_retries(2));
//!
//!     let input = [("topic".to_string(), "borrow checking".into())].into();
//!     let result = chain.execute(&CancellationToken::new(), input).await?;
//!     println!("{}", result.get("draft").unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod task;

pub use chain::{Chain, ChainResult, Condition, Step, StepOptions};
pub use config::{Pipeline, PipelineConfig};
pub use error::{
    ChainError, ChainFailure, ExecutorError, OrchestratorError, RenderError, Result,
};
pub use executor::{ExecuteRequest, ExecuteResult, Executor, RetryPolicy, DEFAULT_MODEL};
pub use task::{Input, PromptTask, Rendered, Task, Variable, VariableKind};

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
