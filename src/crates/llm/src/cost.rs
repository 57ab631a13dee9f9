//! Token counting and cost estimation.
//!
//! Prices are USD per 1K tokens.

use crate::types::TokenUsage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Estimates how many tokens a text will use.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> u32;
}

/// Rough heuristic: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleCounter;

impl TokenCounter for SimpleCounter {
    fn count_tokens(&self, text: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        chars.div_ceil(4)
    }
}

/// Per-1K-token pricing for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Pricing {
    /// Create pricing.
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost in USD of the given token counts.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        f64::from(prompt_tokens) / 1000.0 * self.input_per_1k
            + f64::from(completion_tokens) / 1000.0 * self.output_per_1k
    }
}

/// Result of [`Estimator::estimate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub input_tokens: u32,
    pub input_usd: f64,
    pub output_usd: f64,
    pub total_usd: f64,
}

/// Predicts the cost of a rendered prompt before it is sent.
///
/// # Example
///
/// ```rust
/// use llm::cost::Estimator;
///
/// let estimator = Estimator::new("gpt-4", 0.03, 0.06);
/// let estimate = estimator.estimate("You are terse.", "Summarise this text", 500);
/// assert!(estimate.total_usd > 0.0);
/// ```
pub struct Estimator {
    model: String,
    pricing: Pricing,
    counter: Arc<dyn TokenCounter>,
}

impl Estimator {
    /// Create an estimator using [`SimpleCounter`].
    pub fn new(model: impl Into<String>, input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            model: model.into(),
            pricing: Pricing::new(input_per_1k, output_per_1k),
            counter: Arc::new(SimpleCounter),
        }
    }

    /// Use a different token counter.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Model this estimator prices.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Estimate the cost of sending `system` + `user` and receiving
    /// `expected_output_tokens`.
    pub fn estimate(&self, system: &str, user: &str, expected_output_tokens: u32) -> CostEstimate {
        let input_tokens = self
            .counter
            .count_tokens(system)
            .saturating_add(self.counter.count_tokens(user));
        let input_usd = self.pricing.cost(input_tokens, 0);
        let output_usd = self.pricing.cost(0, expected_output_tokens);

        CostEstimate {
            input_tokens,
            input_usd,
            output_usd,
            total_usd: input_usd + output_usd,
        }
    }
}

/// Accumulates actual usage and spend across requests.
///
/// Token totals are kept for every model; spend only for models with
/// registered pricing.
#[derive(Default)]
pub struct CostTracker {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    inner: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    total_usd: f64,
    pricing: HashMap<String, Pricing>,
}

impl CostTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pricing for `model`.
    pub fn register_model(&self, model: impl Into<String>, input_per_1k: f64, output_per_1k: f64) {
        self.inner
            .lock()
            .pricing
            .insert(model.into(), Pricing::new(input_per_1k, output_per_1k));
    }

    /// Record one response's usage, returning its cost (zero for unpriced models).
    pub fn record(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.input_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.output_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);

        let mut inner = self.inner.lock();
        let Some(pricing) = inner.pricing.get(model).copied() else {
            return 0.0;
        };
        let cost = pricing.cost(usage.prompt_tokens, usage.completion_tokens);
        inner.total_usd += cost;
        cost
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    /// Total spend in USD.
    pub fn total_usd(&self) -> f64 {
        self.inner.lock().total_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_counter_rounds_up() {
        let counter = SimpleCounter;
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("a"), 1);
        assert_eq!(counter.count_tokens("abcd"), 1);
        assert_eq!(counter.count_tokens("abcde"), 2);
        // Counts characters, not bytes.
        assert_eq!(counter.count_tokens("éééé"), 1);
    }

    #[test]
    fn test_estimate() {
        let estimator = Estimator::new("gpt-4", 1.0, 2.0);
        let estimate = estimator.estimate("abcd", "abcdefgh", 500);

        assert_eq!(estimate.input_tokens, 3);
        assert!((estimate.input_usd - 0.003).abs() < 1e-12);
        assert!((estimate.output_usd - 1.0).abs() < 1e-12);
        assert!((estimate.total_usd - 1.003).abs() < 1e-12);
    }

    struct Words;

    impl TokenCounter for Words {
        fn count_tokens(&self, text: &str) -> u32 {
            text.split_whitespace().count() as u32
        }
    }

    #[test]
    fn test_custom_counter() {
        let estimator = Estimator::new("m", 1000.0, 0.0).with_token_counter(Arc::new(Words));
        let estimate = estimator.estimate("", "one two three", 0);
        assert_eq!(estimate.input_tokens, 3);
        assert!((estimate.total_usd - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_records_tokens_and_priced_spend() {
        let tracker = CostTracker::new();
        tracker.register_model("gpt-4", 0.03, 0.06);

        let cost = tracker.record("gpt-4", &TokenUsage::new(1000, 500));
        assert!((cost - 0.06).abs() < 1e-12);

        assert_eq!(tracker.record("unpriced", &TokenUsage::new(10, 10)), 0.0);

        assert_eq!(tracker.total_input_tokens(), 1010);
        assert_eq!(tracker.total_output_tokens(), 510);
        assert!((tracker.total_usd() - 0.06).abs() < 1e-12);
    }
}
