//! Middleware layers around a [`CompletionService`].
//!
//! Each layer wraps an inner service and implements the same trait, so
//! layers nest freely. [`chain`] applies a list of layers with the first
//! entry outermost: it sees every call first and the last entry sits next
//! to the real service.
//!
//! Only `complete` is decorated. `stream` and `model_info` pass straight
//! through every layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::middleware::{self, InMemoryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let (metrics_layer, counters) = middleware::metrics();
//! let service = middleware::chain(
//!     base,
//!     vec![
//!         middleware::logging(),
//!         metrics_layer,
//!         middleware::cache(Arc::new(InMemoryCache::new()), None),
//!         middleware::rate_limit(100, Duration::from_secs(60)),
//!         middleware::circuit_breaker(0.5, Duration::from_secs(30)),
//!     ],
//! );
//! ```

mod cache;
mod circuit_breaker;
mod logging;
mod metrics;
mod rate_limit;

pub use cache::{
    cache, cache_key, CachedService, InMemoryCache, ResponseCache, DEFAULT_CACHE_TTL, MAX_CACHE_TTL,
};
pub use circuit_breaker::{
    circuit_breaker, CircuitBreakerService, CircuitState, MIN_REQUESTS_BEFORE_TRIP,
};
pub use logging::{logging, LoggingService};
pub use metrics::{metrics, MetricsCounters, MetricsService, MetricsSnapshot};
pub use rate_limit::{rate_limit, RateLimitedService};

use crate::service::CompletionService;
use std::sync::Arc;

/// A layer that wraps one service in another.
pub type Middleware =
    Box<dyn FnOnce(Arc<dyn CompletionService>) -> Arc<dyn CompletionService> + Send>;

/// Wrap `service` in `middlewares`, first entry outermost.
pub fn chain(
    service: Arc<dyn CompletionService>,
    middlewares: Vec<Middleware>,
) -> Arc<dyn CompletionService> {
    middlewares
        .into_iter()
        .rev()
        .fold(service, |inner, middleware| middleware(inner))
}
