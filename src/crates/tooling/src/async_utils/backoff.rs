//! Backoff policies for retry loops
//!
//! A backoff policy is a pure function from a 0-based attempt index to the
//! duration to wait before the next attempt. Policies are cheap to clone and
//! are passed explicitly to whoever runs the retry loop.

use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default initial delay for [`BackoffPolicy::default`]
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Default delay cap for [`BackoffPolicy::default`]
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff parameters
///
/// Delay for attempt `n` is `initial * factor^n`, capped at `max`, with an
/// optional random jitter factor between 0.5 and 1.5 applied after capping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    /// Delay before the first retry
    pub initial: Duration,

    /// Multiplier applied per attempt
    pub factor: f64,

    /// Upper bound on the un-jittered delay
    pub max: Duration,

    /// Whether to add random jitter to delays
    pub jitter: bool,
}

impl ExponentialBackoff {
    /// Create a doubling backoff without jitter
    ///
    /// # Example
    ///
    /// ```rust
    /// use tooling::async_utils::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
    /// assert_eq!(backoff.delay(0), Duration::from_millis(100));
    /// assert_eq!(backoff.delay(3), Duration::from_millis(800));
    /// assert_eq!(backoff.delay(10), Duration::from_secs(1));
    /// ```
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            factor: 2.0,
            max,
            jitter: false,
        }
    }

    /// Set the backoff factor
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial.as_secs_f64() * self.factor.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        let seconds = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        // A NaN or negative product can only come from a degenerate factor
        if !seconds.is_finite() || seconds < 0.0 {
            return self.max;
        }
        Duration::try_from_secs_f64(seconds).unwrap_or(self.max)
    }
}

/// A shareable `attempt -> delay` function
///
/// # Example
///
/// ```rust
/// use tooling::async_utils::backoff::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::constant(Duration::from_millis(50));
/// assert_eq!(policy.delay(0), Duration::from_millis(50));
/// assert_eq!(policy.delay(7), Duration::from_millis(50));
///
/// let none = BackoffPolicy::none();
/// assert_eq!(none.delay(3), Duration::ZERO);
/// ```
#[derive(Clone)]
pub struct BackoffPolicy {
    delay_fn: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl BackoffPolicy {
    /// Build a policy from an arbitrary function
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            delay_fn: Arc::new(f),
        }
    }

    /// Doubling delays starting at `initial`, capped at `max`
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        ExponentialBackoff::new(initial, max).into()
    }

    /// The same delay before every retry
    pub fn constant(delay: Duration) -> Self {
        Self::from_fn(move |_| delay)
    }

    /// Retry immediately
    pub fn none() -> Self {
        Self::constant(Duration::ZERO)
    }

    /// Delay to wait after the given 0-based attempt failed
    pub fn delay(&self, attempt: u32) -> Duration {
        (self.delay_fn)(attempt)
    }
}

impl From<ExponentialBackoff> for BackoffPolicy {
    fn from(backoff: ExponentialBackoff) -> Self {
        Self::from_fn(move |attempt| backoff.delay(attempt))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffPolicy").finish_non_exhaustive()
    }
}
