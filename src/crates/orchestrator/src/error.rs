//! Error types for task rendering, execution and chains.

use crate::chain::ChainResult;
use llm::LlmError;
use std::time::Duration;
use thiserror::Error;

/// A task could not turn its input into prompt text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// A required variable was neither supplied nor defaulted
    #[error("missing required variable '{0}'")]
    MissingVariable(String),

    /// The template references a name nothing provides
    #[error("unresolved placeholder '{{{{{0}}}}}'")]
    UnresolvedPlaceholder(String),

    /// A supplied value has the wrong type
    #[error("invalid value for '{name}': {message}")]
    InvalidValue { name: String, message: String },

    #[error("render failed: {0}")]
    Other(String),
}

/// Why a single task execution failed
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Rendering failed; the service was never called
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Retries exhausted, or the service returned a non-retryable error
    #[error("completion failed after {attempts} attempt(s): {source}")]
    Service { attempts: u32, source: LlmError },

    /// The execution timeout elapsed
    #[error("timed out after {timeout:?} ({attempts} attempt(s))")]
    Timeout { timeout: Duration, attempts: u32 },

    /// The caller's cancellation token fired
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl ExecutorError {
    /// Attempts made against the service before failing
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::Render(_) => 0,
            ExecutorError::Service { attempts, .. }
            | ExecutorError::Timeout { attempts, .. }
            | ExecutorError::Cancelled { attempts } => *attempts,
        }
    }

    /// Whether a fallback task may be tried after this error
    pub fn allows_fallback(&self) -> bool {
        matches!(self, ExecutorError::Render(_) | ExecutorError::Service { .. })
    }
}

/// Why a chain stopped
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// A step failed after retries and fallback
    #[error("step '{step}' failed: {source}")]
    Step { step: String, source: ExecutorError },

    /// The caller's cancellation token fired
    #[error("chain cancelled")]
    Cancelled,

    /// A parallel step's task panicked
    #[error("step '{step}' panicked: {message}")]
    Panicked { step: String, message: String },

    /// Two steps share a name
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
}

impl ChainError {
    /// Name of the step that failed, if one did
    pub fn step(&self) -> Option<&str> {
        match self {
            ChainError::Step { step, .. } | ChainError::Panicked { step, .. } => Some(step),
            ChainError::DuplicateStep(step) => Some(step),
            ChainError::Cancelled => None,
        }
    }
}

/// A chain error together with the outputs of every node that completed
/// before it
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ChainFailure {
    /// Outputs recorded before the failing node
    pub partial: ChainResult,

    pub error: ChainError,
}

impl ChainFailure {
    pub fn new(partial: ChainResult, error: ChainError) -> Self {
        Self { partial, error }
    }

    /// Discard the partial result
    pub fn into_error(self) -> ChainError {
        self.error
    }
}

/// Errors that can occur while assembling a pipeline
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration values are out of range
    #[error(transparent)]
    InvalidConfig(#[from] tooling::ToolingError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
