//! Fail-fast guard for a failing service.
//!
//! ```text
//!  closed ──(≥10 requests, failure rate ≥ threshold)──▶ open
//!    ▲                                                  │
//!    │ trial succeeds                     timeout elapsed│
//!    │                                                  ▼
//!    └─────────────────────── half-open ◀───────────────┘
//!                               │ trial fails
//!                               └──────────────▶ open (fresh timeout)
//! ```
//!
//! Half-open admits exactly one trial request. Anything arriving while the
//! trial is in flight is rejected the same way an open breaker rejects it.

use super::Middleware;
use crate::error::{LlmError, Result};
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Requests observed in the closed state before the failure rate is checked.
pub const MIN_REQUESTS_BEFORE_TRIP: u64 = 10;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    requests: u64,
    failures: u64,
    /// `None` when the timeout reaches past what `Instant` can represent.
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn trip(&mut self, now: Instant, timeout: Duration) {
        self.state = CircuitState::Open;
        self.open_until = now.checked_add(timeout);
        self.requests = 0;
        self.failures = 0;
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.requests = 0;
        self.failures = 0;
        self.trial_in_flight = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Caller cancellation says nothing about the service's health.
    Ignored,
}

/// Permission to call the inner service.
///
/// Dropping a trial admission without recording an outcome (the caller's
/// future was dropped mid-call) frees the half-open slot for the next
/// request.
struct Admission {
    state: Arc<Mutex<BreakerState>>,
    trial: bool,
    recorded: bool,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.trial && !self.recorded {
            let mut state = self.state.lock();
            if state.state == CircuitState::HalfOpen {
                state.trial_in_flight = false;
            }
        }
    }
}

/// Stops calling the inner service once its failure rate crosses `threshold`.
pub struct CircuitBreakerService {
    inner: Arc<dyn CompletionService>,
    threshold: f64,
    timeout: Duration,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreakerService {
    /// Wrap `inner`. `threshold` is a failure ratio in (0, 1]; `timeout` is
    /// how long the breaker stays open.
    pub fn new(inner: Arc<dyn CompletionService>, threshold: f64, timeout: Duration) -> Self {
        Self {
            inner,
            threshold,
            timeout,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                requests: 0,
                failures: 0,
                open_until: None,
                trial_in_flight: false,
            })),
        }
    }

    /// Current state. An open breaker whose timeout has elapsed still
    /// reports `Open` until the next request moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// `(requests, failures)` counted since the last transition.
    pub fn counts(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.requests, state.failures)
    }

    fn admit(&self) -> Result<Admission> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let trial = match state.state {
            CircuitState::Closed => false,
            CircuitState::Open if state.open_until.map_or(true, |at| now < at) => {
                return Err(LlmError::CircuitOpen {
                    retry_after: state.open_until.map_or(Duration::MAX, |at| at - now),
                });
            }
            CircuitState::Open => {
                tracing::info!("circuit breaker half-open, admitting trial request");
                state.state = CircuitState::HalfOpen;
                state.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen if state.trial_in_flight => {
                return Err(LlmError::CircuitOpen {
                    retry_after: Duration::ZERO,
                });
            }
            CircuitState::HalfOpen => {
                state.trial_in_flight = true;
                true
            }
        };

        Ok(Admission {
            state: self.state.clone(),
            trial,
            recorded: false,
        })
    }

    fn record(&self, mut admission: Admission, outcome: Outcome) {
        admission.recorded = true;
        let now = Instant::now();
        let mut state = self.state.lock();

        if admission.trial {
            if state.state != CircuitState::HalfOpen {
                return;
            }
            match outcome {
                Outcome::Success => {
                    state.close();
                    tracing::info!("circuit breaker closed");
                }
                Outcome::Failure => {
                    state.trip(now, self.timeout);
                    tracing::warn!(timeout = ?self.timeout, "circuit breaker re-opened after failed trial");
                }
                Outcome::Ignored => state.trial_in_flight = false,
            }
            return;
        }

        // Calls admitted while closed that finish after a trip don't count
        // towards the next cycle.
        if state.state != CircuitState::Closed || outcome == Outcome::Ignored {
            return;
        }

        state.requests += 1;
        if outcome == Outcome::Failure {
            state.failures += 1;
        }

        if state.requests >= MIN_REQUESTS_BEFORE_TRIP {
            let rate = state.failures as f64 / state.requests as f64;
            if rate >= self.threshold {
                tracing::warn!(
                    failure_rate = rate,
                    requests = state.requests,
                    timeout = ?self.timeout,
                    "circuit breaker opened"
                );
                state.trip(now, self.timeout);
            }
        }
    }
}

/// Circuit breaker layer, e.g. `circuit_breaker(0.5, Duration::from_secs(30))`.
pub fn circuit_breaker(threshold: f64, timeout: Duration) -> Middleware {
    Box::new(move |inner| Arc::new(CircuitBreakerService::new(inner, threshold, timeout)))
}

#[async_trait]
impl CompletionService for CircuitBreakerService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        let admission = self.admit()?;

        let result = self.inner.complete(cancel, request).await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_cancellation() => Outcome::Ignored,
            Err(LlmError::CircuitOpen { .. }) => Outcome::Ignored,
            Err(_) => Outcome::Failure,
        };
        self.record(admission, outcome);

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
