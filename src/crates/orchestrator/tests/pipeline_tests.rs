//! Integration tests for executor and chain over configured pipelines

use anyhow::Result;
use llm::testing::{EchoService, ScriptedService};
use llm::LlmError;
use orchestrator::{
    Chain, ChainError, ExecuteRequest, Executor, ExecutorError, Input, PipelineConfig, PromptTask,
    Step, StepOptions, Task, Variable,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tooling::async_utils::backoff::BackoffPolicy;

fn task(name: &str) -> Arc<dyn Task> {
    Arc::new(PromptTask::new(name, name))
}

#[tokio::test]
async fn test_chain_outputs_keyed_by_step_name() -> Result<()> {
    let executor = Executor::new(Arc::new(EchoService::new()));
    let chain = Chain::new("letters")
        .with_executor(executor)
        .then(Step::new("a", task("a")))
        .parallel(vec![Step::new("b", task("b")), Step::new("c", task("c"))])
        .then(Step::new("d", task("d")));

    let result = chain.execute(&CancellationToken::new(), Input::new()).await?;

    let expected: HashMap<String, String> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|name| (name.to_string(), name.to_string()))
        .collect();
    assert_eq!(result.into_map(), expected);
    Ok(())
}

#[tokio::test]
async fn test_executor_retries_until_success() -> Result<()> {
    let service = Arc::new(
        ScriptedService::new()
            .then_err(LlmError::Service("busy".into()))
            .then_err(LlmError::Service("busy".into()))
            .always_ok("ok"),
    );
    let executor = Executor::new(service.clone()).with_retry(2, BackoffPolicy::none());

    let result = executor
        .execute(&CancellationToken::new(), ExecuteRequest::new(task("q"), Input::new()))
        .await?;

    assert_eq!(result.content, "ok");
    assert_eq!(result.attempts, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_configured_pipeline_runs_chain() -> Result<()> {
    let config = PipelineConfig::from_yaml_str(
        r#"
executor:
  default_model: test-model
  max_retries: 1
  backoff:
    initial_ms: 10
    max_ms: 100
middleware:
  logging: true
  metrics: true
  cache: true
  rate_limit:
    limit: 100
    window_ms: 1000
  circuit_breaker:
    threshold: 0.5
"#,
    )?;
    let service = Arc::new(EchoService::new().with_latency(Duration::from_millis(5)));
    let pipeline = config.build(service.clone());
    let metrics = pipeline.metrics.clone().expect("metrics enabled");

    let summarise: Arc<dyn Task> = Arc::new(
        PromptTask::new("summarise", "Summary of {{doc}}")
            .with_variable(Variable::new("doc").required()),
    );
    let chain = Chain::new("report")
        .with_executor(pipeline.executor.clone())
        .step("summary", summarise.clone(), StepOptions::new())
        .parallel(vec![
            // identical prompt, served from cache
            Step::new("again", summarise),
            Step::new(
                "title",
                Arc::new(PromptTask::new("title", "Title for {{summary}}")),
            ),
        ]);
    let input = Input::from([("doc".to_string(), json!("the quarterly numbers"))]);

    let result = chain.execute(&CancellationToken::new(), input).await?;

    assert_eq!(result.get("summary"), Some("Summary of the quarterly numbers"));
    assert_eq!(result.get("again"), result.get("summary"));
    assert_eq!(result.get("title"), Some("Title for Summary of the quarterly numbers"));
    assert_eq!(service.calls(), 2);
    assert_eq!(metrics.requests(), 3);
    assert!(service.log().iter().all(|call| call.model == "test-model"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_spreads_parallel_group() -> Result<()> {
    let config = PipelineConfig::from_yaml_str(
        "middleware:\n  rate_limit:\n    limit: 2\n    window_ms: 1000\n",
    )?;
    let pipeline = config.build(Arc::new(EchoService::new()));
    let steps = (0..3)
        .map(|i| Step::new(format!("s{i}"), task(&format!("prompt {i}"))))
        .collect();
    let chain = Chain::new("limited")
        .with_executor(pipeline.executor.clone())
        .parallel(steps);
    let start = Instant::now();

    let result = chain.execute(&CancellationToken::new(), Input::new()).await?;

    assert_eq!(result.len(), 3);
    assert!(start.elapsed() >= Duration::from_millis(500));
    Ok(())
}

#[tokio::test]
async fn test_open_breaker_fails_step_without_retry() -> Result<()> {
    let config = PipelineConfig::from_yaml_str(
        r#"
executor:
  max_retries: 3
  backoff:
    initial_ms: 0
    max_ms: 0
middleware:
  circuit_breaker:
    threshold: 1.0
    timeout_ms: 60000
"#,
    )?;
    let service = Arc::new(ScriptedService::new().always_err(LlmError::Service("down".into())));
    let pipeline = config.build(service.clone());
    let cancel = CancellationToken::new();

    // 3 executions of 4 attempts each trip the breaker on the 10th call
    for _ in 0..3 {
        let _ = pipeline
            .executor
            .execute(&cancel, ExecuteRequest::new(task("q"), Input::new()))
            .await;
    }
    assert_eq!(service.calls(), 10);

    let chain = Chain::new("guarded")
        .with_executor(pipeline.executor.clone())
        .step("s", task("q"), StepOptions::new());
    let failure = chain.execute(&cancel, Input::new()).await.unwrap_err();

    match failure.error {
        ChainError::Step {
            source: ExecutorError::Service { attempts, source: LlmError::CircuitOpen { .. } },
            ..
        } => assert_eq!(attempts, 1),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.calls(), 10);
    Ok(())
}
