//! Rate limiting utilities
//!
//! Provides a bounded permit pool for capping how many operations may start
//! within a time window.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Smallest replenishment interval the limiter will use
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Returned by [`RateLimiter::acquire`] when the wait is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("permit wait cancelled")]
pub struct AcquireCancelled;

/// Bounded permit pool rate limiter
///
/// Starts with `limit` permits. One permit is added back every
/// `window / limit` (never less than [`MIN_TICK`]), and the pool never holds
/// more than `limit` permits. Ticks are anchored at construction time and
/// applied lazily whenever the pool is inspected, so no background task is
/// needed. Taking a permit is atomic with respect to other callers.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::rate_limit::RateLimiter;
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// // 100 requests per minute
/// let limiter = RateLimiter::new(100, Duration::from_secs(60));
/// limiter.acquire(&CancellationToken::new()).await?;
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<PermitPool>>,
    limit: usize,
    tick: Duration,
}

struct PermitPool {
    /// Maximum number of permits
    capacity: usize,

    /// Permits ready to be taken
    available: usize,

    /// Replenishment interval
    tick: Duration,

    /// Boundary of the last applied tick
    last_tick: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter admitting `limit` operations per `window`
    ///
    /// A `limit` of zero is treated as one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tooling::rate_limit::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let limiter = RateLimiter::new(10, Duration::from_secs(1));
    /// assert_eq!(limiter.limit(), 10);
    /// assert_eq!(limiter.tick(), Duration::from_millis(100));
    /// ```
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        let divisor = u32::try_from(limit).unwrap_or(u32::MAX);
        let tick = (window / divisor).max(MIN_TICK);

        Self {
            state: Arc::new(Mutex::new(PermitPool {
                capacity: limit,
                available: limit,
                tick,
                last_tick: Instant::now(),
            })),
            limit,
            tick,
        }
    }

    /// Configured maximum number of permits
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Interval at which one permit is added back
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Take a permit if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut pool = self.state.lock().await;
        pool.replenish(Instant::now());
        pool.take()
    }

    /// Wait until a permit is available or `cancel` fires
    ///
    /// On cancellation no permit is consumed.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), AcquireCancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(AcquireCancelled);
            }

            let next_tick = {
                let mut pool = self.state.lock().await;
                pool.replenish(Instant::now());
                if pool.take() {
                    return Ok(());
                }
                pool.last_tick + pool.tick
            };

            tracing::trace!(wait = ?next_tick.saturating_duration_since(Instant::now()), "waiting for rate limit permit");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AcquireCancelled),
                _ = tokio::time::sleep_until(next_tick) => {}
            }
        }
    }

    /// Number of permits that can be taken immediately
    pub async fn available(&self) -> usize {
        let mut pool = self.state.lock().await;
        pool.replenish(Instant::now());
        pool.available
    }
}

impl PermitPool {
    /// Apply every whole tick that elapsed since the last one
    fn replenish(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let tick_nanos = self.tick.as_nanos().max(1);
        let ticks = elapsed.as_nanos() / tick_nanos;
        if ticks == 0 {
            return;
        }

        let added = usize::try_from(ticks).unwrap_or(usize::MAX);
        self.available = self.available.saturating_add(added).min(self.capacity);

        let remainder = u64::try_from(elapsed.as_nanos() % tick_nanos).unwrap_or(0);
        self.last_tick = now - Duration::from_nanos(remainder);
    }

    fn take(&mut self) -> bool {
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }
}
