//! Pipeline Configuration
//!
//! One YAML document configures both the executor and the middleware
//! stack around the completion service:
//!
//! ```yaml
//! executor:
//!   default_model: gpt-4o-mini
//!   max_retries: 2
//!   base_timeout_ms: 30000
//!   backoff:
//!     initial_ms: 250
//!     max_ms: 10000
//!     jitter: true
//! middleware:
//!   logging: true
//!   metrics: true
//!   cache: true
//!   rate_limit:
//!     limit: 60
//!   circuit_breaker:
//!     threshold: 0.5
//! ```
//!
//! Environment variables prefixed with [`ENV_PREFIX`] override file values,
//! e.g. `LOOM_MAX_RETRIES=5` or `LOOM_RATE_LIMIT=10`.

use crate::error::{OrchestratorError, Result};
use crate::executor::{Executor, DEFAULT_MODEL};
use llm::middleware::MetricsCounters;
use llm::{CompletionService, MiddlewareConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tooling::async_utils::backoff::{
    BackoffPolicy, ExponentialBackoff, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY,
};
use tooling::config::{build_env_key, get_env, get_env_bool, get_env_parse, ConfigBuilder};
use tooling::ToolingError;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "LOOM_";

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Growth per attempt
    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default)]
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            factor: default_factor(),
            jitter: false,
        }
    }
}

impl BackoffConfig {
    pub fn policy(&self) -> BackoffPolicy {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_ms),
            Duration::from_millis(self.max_ms),
        )
        .with_factor(self.factor)
        .with_jitter(self.jitter)
        .into()
    }
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub max_retries: u32,

    /// Bounds each execution; unset or zero means unbounded
    #[serde(default)]
    pub base_timeout_ms: Option<u64>,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            max_retries: 0,
            base_timeout_ms: None,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

/// An executor over a configured middleware stack
pub struct Pipeline {
    pub executor: Arc<Executor>,

    /// Present when metrics are enabled
    pub metrics: Option<MetricsCounters>,
}

impl PipelineConfig {
    /// Parse YAML without consulting the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::Config(format!("Failed to parse YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file, apply `LOOM_*` overrides, then validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config: Self = serde_yaml::from_str(&content)
            .map_err(|e| OrchestratorError::Config(format!("Failed to parse YAML config: {}", e)))?;
        config.apply_env(ENV_PREFIX)?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            model = %config.executor.default_model,
            max_retries = config.executor.max_retries,
            "Loaded pipeline config"
        );
        Ok(config)
    }

    /// Wrap `service` in the middleware stack and put an executor on top
    pub fn build(&self, service: Arc<dyn CompletionService>) -> Pipeline {
        let stack = self.middleware.build(service);
        let mut executor = Executor::new(stack.service)
            .with_retry(self.executor.max_retries, self.executor.backoff.policy())
            .with_default_model(self.executor.default_model.clone());
        if let Some(timeout_ms) = self.executor.base_timeout_ms {
            executor = executor.with_timeout(Duration::from_millis(timeout_ms));
        }

        Pipeline {
            executor: Arc::new(executor),
            metrics: stack.metrics,
        }
    }
}

impl ConfigBuilder for ExecutorConfig {
    fn validate(&self) -> tooling::Result<()> {
        if self.default_model.trim().is_empty() {
            return Err(ToolingError::InvalidConfig(
                "executor.default_model must not be empty".into(),
            ));
        }
        let factor = self.backoff.factor;
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ToolingError::InvalidConfig(format!(
                "executor.backoff.factor must be positive, got {}",
                factor
            )));
        }
        if self.backoff.initial_ms > self.backoff.max_ms {
            return Err(ToolingError::InvalidConfig(format!(
                "executor.backoff.initial_ms ({}) exceeds max_ms ({})",
                self.backoff.initial_ms, self.backoff.max_ms
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
        if let Some(model) = get_env(&build_env_key(prefix, "default_model"))? {
            self.default_model = model;
        }
        if let Some(retries) = get_env_parse(&build_env_key(prefix, "max_retries"))? {
            self.max_retries = retries;
        }
        if let Some(timeout_ms) = get_env_parse(&build_env_key(prefix, "base_timeout_ms"))? {
            self.base_timeout_ms = Some(timeout_ms);
        }
        if let Some(initial_ms) = get_env_parse(&build_env_key(prefix, "backoff_initial_ms"))? {
            self.backoff.initial_ms = initial_ms;
        }
        if let Some(max_ms) = get_env_parse(&build_env_key(prefix, "backoff_max_ms"))? {
            self.backoff.max_ms = max_ms;
        }
        if let Some(factor) = get_env_parse(&build_env_key(prefix, "backoff_factor"))? {
            self.backoff.factor = factor;
        }
        if let Some(jitter) = get_env_bool(&build_env_key(prefix, "backoff_jitter"))? {
            self.backoff.jitter = jitter;
        }
        Ok(())
    }
}

impl ConfigBuilder for PipelineConfig {
    fn validate(&self) -> tooling::Result<()> {
        self.executor.validate()?;
        self.middleware.validate()
    }

    fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
        self.executor.apply_env(prefix)?;
        self.middleware.apply_env(prefix)
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_initial_ms() -> u64 {
    DEFAULT_INITIAL_DELAY.as_millis() as u64
}

fn default_max_ms() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}

fn default_factor() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, PoisonError};
    use tempfile::NamedTempFile;

    /// `from_file` and `from_env_with_defaults` read the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.executor.default_model, "gpt-3.5-turbo");
        assert_eq!(config.executor.max_retries, 0);
        assert_eq!(config.executor.backoff.initial_ms, 500);
        assert_eq!(config.executor.backoff.max_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = PipelineConfig::from_yaml_str(
            r#"
executor:
  max_retries: 3
  backoff:
    initial_ms: 100
middleware:
  metrics: true
  rate_limit:
    limit: 10
"#,
        )
        .unwrap();

        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.default_model, DEFAULT_MODEL);
        assert_eq!(config.executor.backoff.initial_ms, 100);
        assert_eq!(config.executor.backoff.max_ms, 30_000);
        assert!(config.middleware.metrics);
        assert_eq!(config.middleware.rate_limit.as_ref().unwrap().window_ms, 60_000);
    }

    #[test]
    fn test_backoff_policy_from_config() {
        let backoff = BackoffConfig {
            initial_ms: 100,
            max_ms: 1000,
            factor: 3.0,
            jitter: false,
        };
        let policy = backoff.policy();

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(300));
        assert_eq!(policy.delay(5), Duration::from_millis(1000));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.executor.backoff.factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.executor.default_model = "  ".into();
        assert!(config.validate().is_err());

        let result = PipelineConfig::from_yaml_str("middleware:\n  circuit_breaker:\n    threshold: 2.0\n");
        assert!(matches!(result, Err(OrchestratorError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unbounded_cache_ttl() {
        let yaml = format!("middleware:\n  cache: true\n  cache_ttl_secs: {}\n", u64::MAX);
        let result = PipelineConfig::from_yaml_str(&yaml);
        assert!(matches!(result, Err(OrchestratorError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = PipelineConfig::from_yaml_str("executor: [not, a, map]");
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "executor:\n  default_model: gpt-4o\n  base_timeout_ms: 2500\nmiddleware:\n  cache: true"
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.executor.default_model, "gpt-4o");
        assert_eq!(config.executor.base_timeout_ms, Some(2500));
        assert!(config.middleware.cache);

        let pipeline = config.build(Arc::new(llm::testing::EchoService::new()));
        assert_eq!(pipeline.executor.default_model(), "gpt-4o");
        assert_eq!(pipeline.executor.base_timeout(), Some(Duration::from_millis(2500)));
        assert!(pipeline.metrics.is_none());
    }

    #[test]
    fn test_missing_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let result = PipelineConfig::from_file("/nonexistent/loom.yaml");
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[test]
    fn test_env_overrides_executor() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        std::env::set_var("ORCH_CFG_TEST_MAX_RETRIES", "4");
        std::env::set_var("ORCH_CFG_TEST_BACKOFF_JITTER", "true");
        std::env::set_var("ORCH_CFG_TEST_CACHE", "1");
        let config = PipelineConfig::from_env_with_defaults("ORCH_CFG_TEST_");
        std::env::remove_var("ORCH_CFG_TEST_MAX_RETRIES");
        std::env::remove_var("ORCH_CFG_TEST_BACKOFF_JITTER");
        std::env::remove_var("ORCH_CFG_TEST_CACHE");

        let config = config.unwrap();
        assert_eq!(config.executor.max_retries, 4);
        assert!(config.executor.backoff.jitter);
        assert!(config.middleware.cache);
    }
}
