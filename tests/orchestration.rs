//! End-to-end orchestration scenarios over the built-in providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use conductor::agent::Agent;
use conductor::capability::preset;
use conductor::config::OrchestratorConfig;
use conductor::error::ProviderError;
use conductor::events::{self, ExecutionEvent};
use conductor::orchestrator::Orchestrator;
use conductor::provider::{BuiltinProvider, CapabilityProvider};
use conductor::task::{Task, TaskStatus};
use conductor::workflow::{Workflow, WorkflowStep};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn builtin(base_dir: &std::path::Path) -> Arc<dyn CapabilityProvider> {
    Arc::new(BuiltinProvider::new(base_dir.to_path_buf()))
}

fn calc_task(name: &str, op: &str, a: f64, b: f64) -> Task {
    let mut params = Map::new();
    params.insert("operation".into(), json!(op));
    params.insert("a".into(), json!(a));
    params.insert("b".into(), json!(b));
    Task::new(name, "arithmetic", "calculation").with_parameters(params)
}

async fn team(dir: &std::path::Path) -> (Orchestrator, Arc<Agent>, Arc<Agent>) {
    let calc = Arc::new(Agent::new(
        "calculator-agent",
        preset("calculator").unwrap(),
        builtin(dir),
    ));
    let files = Arc::new(Agent::new(
        "file-agent",
        preset("file-ops").unwrap(),
        builtin(dir),
    ));

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    orchestrator.register(calc.clone()).await;
    orchestrator.register(files.clone()).await;
    orchestrator.connect_all().await;
    (orchestrator, calc, files)
}

#[tokio::test]
async fn calculation_routes_and_updates_statistics() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, calc, _) = team(dir.path()).await;

    let mut task = calc_task("sum", "add", 15.0, 27.0);
    let result = orchestrator.execute(&mut task, None).await.unwrap();

    assert!(result.success);
    assert_eq!(result.data.as_ref().unwrap()["result"], json!(42.0));
    assert_eq!(result.metadata["agent_name"], json!("calculator-agent"));
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_agent_id, Some(calc.id()));

    let stats = orchestrator.statistics().await;
    assert_eq!(stats.total_tasks_executed, 1);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.overall_success_rate, 100.0);
}

#[tokio::test]
async fn division_by_zero_completes_without_retries() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _, _) = team(dir.path()).await;

    let mut task = calc_task("bad-division", "divide", 1.0, 0.0);
    let result = orchestrator.execute(&mut task, None).await.unwrap();

    // A domain-level error is a successful invocation, never a fault.
    assert!(result.success);
    assert_eq!(
        result.data.as_ref().unwrap()["error"],
        json!("division by zero")
    );
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn delegation_through_a_coordinator() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let coordinator = Arc::new(Agent::new(
        "coordinator",
        preset("calculator").unwrap(),
        builtin(dir.path()),
    ));
    let weather_sub = Arc::new(Agent::new(
        "weather-sub",
        preset("weather").unwrap(),
        builtin(dir.path()),
    ));
    coordinator.register_subagent(weather_sub.clone()).await;

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    orchestrator.register(coordinator.clone()).await;
    orchestrator.connect_all().await;
    weather_sub.connect();

    let mut params = Map::new();
    params.insert("city".into(), json!("Lisbon"));
    let mut task = Task::new("forecast", "current weather", "weather").with_parameters(params);

    // Pinning bypasses capability matching, so the coordinator receives a
    // task it can only serve by delegating.
    let result = orchestrator
        .execute(&mut task, Some(coordinator.id()))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata["agent_name"], json!("weather-sub"));
    assert_eq!(task.assigned_agent_id, Some(weather_sub.id()));
    assert_eq!(coordinator.history().await.len(), 1);
    assert_eq!(weather_sub.history().await.len(), 1);
}

#[tokio::test]
async fn workflow_pipes_files_between_steps() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _, _) = team(dir.path()).await;

    let mut write_params = Map::new();
    write_params.insert("operation".into(), json!("write"));
    write_params.insert("path".into(), json!("report.txt"));
    write_params.insert("content".into(), json!("42"));
    let write = Task::new("write-report", "persist", "file_write").with_parameters(write_params);

    let mut read_params = Map::new();
    read_params.insert("operation".into(), json!("read"));
    read_params.insert("path".into(), json!("report.txt"));
    let read = Task::new("read-report", "load", "file_read").with_parameters(read_params);

    let workflow = Workflow::new(
        "report-pipeline",
        vec![
            WorkflowStep::new("compute", vec![calc_task("sum", "add", 40.0, 2.0)]),
            WorkflowStep::new("persist", vec![write]).after(["compute"]),
            WorkflowStep::new("verify", vec![read]).after(["persist"]),
        ],
    )
    .unwrap();

    let results = orchestrator.execute_workflow(workflow).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results["compute"][0].success);
    assert!(results["persist"][0].success);

    let read_back = results["verify"][0].data.as_ref().unwrap();
    assert_eq!(read_back["content"], json!("42"));
    assert!(orchestrator.workflow_completed("report-pipeline").await);

    let stats = orchestrator.statistics().await;
    assert_eq!(stats.workflows_executed, 1);
    assert_eq!(stats.total_tasks_executed, 3);
}

#[tokio::test]
async fn sequential_and_parallel_batches_agree_on_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _, _) = team(dir.path()).await;

    let build = || {
        vec![
            calc_task("a", "add", 1.0, 2.0),
            calc_task("b", "multiply", 3.0, 4.0),
            calc_task("c", "subtract", 10.0, 5.0),
        ]
    };

    let mut sequential_tasks = build();
    let sequential = orchestrator
        .execute_batch(&mut sequential_tasks, false, None)
        .await;
    let mut parallel_tasks = build();
    let parallel = orchestrator
        .execute_batch(&mut parallel_tasks, true, Some(2))
        .await;

    assert_eq!(sequential.len(), parallel.len());
    for (s, p) in sequential.iter().zip(parallel.iter()) {
        assert!(s.success && p.success);
        assert_eq!(
            s.data.as_ref().unwrap()["result"],
            p.data.as_ref().unwrap()["result"]
        );
    }
}

struct FlakyProvider {
    failures: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl CapabilityProvider for FlakyProvider {
    async fn invoke(
        &self,
        operation: &str,
        _arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        use std::sync::atomic::Ordering;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::OperationFailed {
                operation: operation.to_string(),
                reason: "transient outage".to_string(),
            });
        }
        Ok(json!({"recovered": true}))
    }
}

#[tokio::test]
async fn retries_are_observable_on_the_event_stream() {
    init_tracing();
    let (tx, mut rx) = events::channel();

    let agent = Arc::new(
        Agent::new(
            "flaky-agent",
            preset("calculator").unwrap(),
            Arc::new(FlakyProvider {
                failures: std::sync::atomic::AtomicUsize::new(2),
            }) as Arc<dyn CapabilityProvider>,
        )
        .with_events(tx),
    );

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    orchestrator.register(agent.clone()).await;
    orchestrator.connect_all().await;

    let mut task = calc_task("flaky", "add", 1.0, 1.0);
    let result = orchestrator.execute(&mut task, None).await.unwrap();
    assert!(result.success);
    assert_eq!(task.retry_count, 2);

    let mut starts = 0;
    let mut retries = 0;
    let mut completed = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ExecutionEvent::TaskStarted { .. } => starts += 1,
            ExecutionEvent::TaskRetried { retry_count, .. } => {
                retries += 1;
                assert!(retry_count >= 1);
            }
            ExecutionEvent::TaskCompleted { .. } => completed += 1,
            _ => {}
        }
    }
    assert_eq!(starts, 3);
    assert_eq!(retries, 2);
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_without_erroring_the_caller() {
    init_tracing();
    let agent = Arc::new(Agent::new(
        "always-down",
        preset("calculator").unwrap(),
        Arc::new(FlakyProvider {
            failures: std::sync::atomic::AtomicUsize::new(usize::MAX),
        }) as Arc<dyn CapabilityProvider>,
    ));

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    orchestrator.register(agent.clone()).await;
    orchestrator.connect_all().await;

    let mut task = calc_task("doomed", "add", 1.0, 1.0).with_max_retries(1);
    let result = orchestrator.execute(&mut task, None).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("transient outage"));
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 1);

    let stats = orchestrator.statistics().await;
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.overall_success_rate, 0.0);
}

#[tokio::test]
async fn workflow_with_missing_pinned_agent_still_finishes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _, _) = team(dir.path()).await;

    let workflow = Workflow::new(
        "partial",
        vec![
            WorkflowStep::new("ghost", vec![calc_task("orphan", "add", 1.0, 1.0)])
                .pinned_to(Uuid::new_v4()),
            WorkflowStep::new("real", vec![calc_task("sum", "add", 2.0, 2.0)]).after(["ghost"]),
        ],
    )
    .unwrap();

    let results = orchestrator.execute_workflow(workflow).await.unwrap();
    assert!(!results["ghost"][0].success);
    assert!(results["real"][0].success);
}

#[tokio::test]
async fn orchestrator_timeout_applies_to_single_tasks() {
    init_tracing();

    struct StuckProvider;

    #[async_trait]
    impl CapabilityProvider for StuckProvider {
        async fn invoke(
            &self,
            _operation: &str,
            _arguments: &Map<String, Value>,
        ) -> Result<Value, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!(null))
        }
    }

    let agent = Arc::new(Agent::new(
        "stuck",
        preset("calculator").unwrap(),
        Arc::new(StuckProvider) as Arc<dyn CapabilityProvider>,
    ));

    let config = OrchestratorConfig {
        default_task_timeout: Some(Duration::from_millis(50)),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(config);
    orchestrator.register(agent).await;
    orchestrator.connect_all().await;

    let mut task = calc_task("slow", "add", 1.0, 1.0);
    let result = orchestrator.execute(&mut task, None).await.unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(task.status, TaskStatus::Failed);
}
