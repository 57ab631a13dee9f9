//! Configuration for the middleware stack around a completion service.

use crate::middleware::{self, InMemoryCache, Middleware, MetricsCounters, MAX_CACHE_TTL};
use crate::service::CompletionService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tooling::config::{build_env_key, get_env_bool, get_env_parse, ConfigBuilder};
use tooling::ToolingError;

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted per window.
    pub limit: usize,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in (0, 1] that opens the breaker.
    pub threshold: f64,

    /// How long the breaker stays open, in milliseconds.
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
}

/// Which middleware layers to install and how.
///
/// Layers are always applied in the same order, outermost first:
/// logging, metrics, cache, rate limiter, circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Log every call through `tracing`.
    #[serde(default)]
    pub logging: bool,

    /// Count requests, errors and tokens.
    #[serde(default)]
    pub metrics: bool,

    /// Cache responses in process memory.
    #[serde(default)]
    pub cache: bool,

    /// Cache entry lifetime in seconds (one hour when unset).
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

/// A composed service plus handles onto its layers.
pub struct ServiceStack {
    /// Outermost layer; call this.
    pub service: Arc<dyn CompletionService>,

    /// Present when metrics are enabled.
    pub metrics: Option<MetricsCounters>,
}

impl MiddlewareConfig {
    /// Wrap `service` in the configured layers.
    pub fn build(&self, service: Arc<dyn CompletionService>) -> ServiceStack {
        let mut layers: Vec<Middleware> = Vec::new();
        let mut metrics = None;

        if self.logging {
            layers.push(middleware::logging());
        }
        if self.metrics {
            let (layer, counters) = middleware::metrics();
            layers.push(layer);
            metrics = Some(counters);
        }
        if self.cache {
            layers.push(middleware::cache(
                Arc::new(InMemoryCache::new()),
                self.cache_ttl_secs.map(Duration::from_secs),
            ));
        }
        if let Some(rate_limit) = &self.rate_limit {
            layers.push(middleware::rate_limit(
                rate_limit.limit,
                Duration::from_millis(rate_limit.window_ms),
            ));
        }
        if let Some(breaker) = &self.circuit_breaker {
            layers.push(middleware::circuit_breaker(
                breaker.threshold,
                Duration::from_millis(breaker.timeout_ms),
            ));
        }

        tracing::debug!(layers = layers.len(), "building middleware stack");
        ServiceStack {
            service: middleware::chain(service, layers),
            metrics,
        }
    }
}

impl ConfigBuilder for MiddlewareConfig {
    fn validate(&self) -> tooling::Result<()> {
        if let Some(ttl) = self.cache_ttl_secs {
            if ttl > MAX_CACHE_TTL.as_secs() {
                return Err(ToolingError::InvalidConfig(format!(
                    "cache_ttl_secs must be at most {}, got {}",
                    MAX_CACHE_TTL.as_secs(),
                    ttl
                )));
            }
        }
        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.limit == 0 {
                return Err(ToolingError::InvalidConfig(
                    "rate_limit.limit must be greater than zero".into(),
                ));
            }
            if rate_limit.window_ms == 0 {
                return Err(ToolingError::InvalidConfig(
                    "rate_limit.window_ms must be greater than zero".into(),
                ));
            }
        }
        if let Some(breaker) = &self.circuit_breaker {
            if !(breaker.threshold > 0.0 && breaker.threshold <= 1.0) {
                return Err(ToolingError::InvalidConfig(format!(
                    "circuit_breaker.threshold must be in (0, 1], got {}",
                    breaker.threshold
                )));
            }
        }
        Ok(())
    }

    fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
        if let Some(logging) = get_env_bool(&build_env_key(prefix, "logging"))? {
            self.logging = logging;
        }
        if let Some(metrics) = get_env_bool(&build_env_key(prefix, "metrics"))? {
            self.metrics = metrics;
        }
        if let Some(cache) = get_env_bool(&build_env_key(prefix, "cache"))? {
            self.cache = cache;
        }
        if let Some(ttl) = get_env_parse(&build_env_key(prefix, "cache_ttl_secs"))? {
            self.cache_ttl_secs = Some(ttl);
        }

        if let Some(limit) = get_env_parse(&build_env_key(prefix, "rate_limit"))? {
            self.rate_limit
                .get_or_insert_with(|| RateLimitConfig {
                    limit,
                    window_ms: default_window_ms(),
                })
                .limit = limit;
        }
        if let Some(window_ms) = get_env_parse(&build_env_key(prefix, "rate_limit_window_ms"))? {
            if let Some(rate_limit) = self.rate_limit.as_mut() {
                rate_limit.window_ms = window_ms;
            }
        }

        if let Some(threshold) = get_env_parse(&build_env_key(prefix, "breaker_threshold"))? {
            self.circuit_breaker
                .get_or_insert_with(|| CircuitBreakerConfig {
                    threshold,
                    timeout_ms: default_breaker_timeout_ms(),
                })
                .threshold = threshold;
        }
        if let Some(timeout_ms) = get_env_parse(&build_env_key(prefix, "breaker_timeout_ms"))? {
            if let Some(breaker) = self.circuit_breaker.as_mut() {
                breaker.timeout_ms = timeout_ms;
            }
        }

        Ok(())
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_breaker_timeout_ms() -> u64 {
    30_000
}
