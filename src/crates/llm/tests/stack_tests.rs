//! Integration tests for composed middleware stacks
//!
//! Exercises the layers together the way a pipeline wires them:
//! metrics outside the cache, the circuit breaker closest to the service.

use anyhow::Result;
use llm::cost::CostTracker;
use llm::middleware::{self, CircuitState, InMemoryCache, MetricsCounters};
use llm::testing::{EchoService, ScriptedService};
use llm::{collect_stream, CompletionRequest, CompletionService, LlmError, MiddlewareConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn stack(inner: Arc<dyn CompletionService>) -> (Arc<dyn CompletionService>, MetricsCounters) {
    let (metrics, counters) = middleware::metrics();
    let service = middleware::chain(
        inner,
        vec![
            middleware::logging(),
            metrics,
            middleware::cache(Arc::new(InMemoryCache::new()), Some(Duration::from_secs(60))),
            middleware::circuit_breaker(0.5, Duration::from_secs(30)),
        ],
    );
    (service, counters)
}

#[tokio::test(start_paused = true)]
async fn test_cached_calls_still_count_as_requests() -> Result<()> {
    let inner = Arc::new(ScriptedService::new().always_ok("cached answer"));
    let (service, counters) = stack(inner.clone());
    let cancel = CancellationToken::new();
    let request = CompletionRequest::new("gpt-4", "What is a monad?");

    let first = service.complete(&cancel, request.clone()).await?;
    let second = service.complete(&cancel, request).await?;

    assert_eq!(first.content, second.content);
    assert_eq!(inner.calls(), 1);
    assert_eq!(counters.requests(), 2);
    assert_eq!(counters.errors(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trips_behind_cache() -> Result<()> {
    let inner = Arc::new(ScriptedService::new().always_err(LlmError::Service("down".into())));
    let (service, counters) = stack(inner.clone());
    let cancel = CancellationToken::new();

    for i in 0..10 {
        let request = CompletionRequest::new("gpt-4", format!("question {i}"));
        assert!(service.complete(&cancel, request).await.is_err());
    }

    let rejected = service
        .complete(&cancel, CompletionRequest::new("gpt-4", "question 0"))
        .await;

    assert!(matches!(rejected, Err(LlmError::CircuitOpen { .. })));
    assert_eq!(inner.calls(), 10);
    assert_eq!(counters.errors(), 11);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_after_timeout() -> Result<()> {
    let inner = Arc::new(
        ScriptedService::new()
            .then_err(LlmError::Service("1".into()))
            .then_err(LlmError::Service("2".into()))
            .then_err(LlmError::Service("3".into()))
            .then_err(LlmError::Service("4".into()))
            .then_err(LlmError::Service("5".into()))
            .then_err(LlmError::Service("6".into()))
            .then_err(LlmError::Service("7".into()))
            .then_err(LlmError::Service("8".into()))
            .then_err(LlmError::Service("9".into()))
            .then_err(LlmError::Service("10".into()))
            .always_ok("healthy"),
    );
    let breaker = Arc::new(middleware::CircuitBreakerService::new(
        inner.clone(),
        0.5,
        Duration::from_secs(30),
    ));
    let cancel = CancellationToken::new();

    for _ in 0..10 {
        let _ = breaker.complete(&cancel, CompletionRequest::new("m", "q")).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;
    let response = breaker
        .complete(&cancel, CompletionRequest::new("m", "q"))
        .await?;

    assert_eq!(response.content, "healthy");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(inner.calls(), 11);
    Ok(())
}

#[tokio::test]
async fn test_stream_flows_through_stack_uncached() -> Result<()> {
    let inner = Arc::new(EchoService::new());
    let (service, counters) = stack(inner.clone());
    let cancel = CancellationToken::new();
    let request = CompletionRequest::new("gpt-4", "one two three");

    let (content, usage) = collect_stream(service.stream(&cancel, request.clone()).await?, &cancel).await?;
    let (again, _) = collect_stream(service.stream(&cancel, request).await?, &cancel).await?;

    assert_eq!(content, "one two three");
    assert_eq!(again, content);
    assert!(usage.is_some());
    assert_eq!(inner.calls(), 2);
    assert_eq!(counters.requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_config_built_stack_tracks_cost() -> Result<()> {
    let config: MiddlewareConfig = serde_json::from_str(
        r#"{"metrics": true, "cache": true, "rate_limit": {"limit": 100}}"#,
    )?;
    let stack = config.build(Arc::new(EchoService::new()));
    let counters = stack.metrics.clone().expect("metrics enabled");
    let tracker = CostTracker::new();
    tracker.register_model("gpt-4", 0.03, 0.06);
    let cancel = CancellationToken::new();

    let response = stack
        .service
        .complete(&cancel, CompletionRequest::new("gpt-4", "Summarise the report"))
        .await?;
    let cost = tracker.record(&response.model, &response.usage);

    assert!(cost > 0.0);
    assert_eq!(tracker.total_input_tokens(), u64::from(response.usage.prompt_tokens));
    assert_eq!(counters.prompt_tokens(), u64::from(response.usage.prompt_tokens));
    Ok(())
}
