//! Multi-agent coordination and workflow scheduling.
//!
//! The orchestrator owns a pool of agents, routes tasks to the first
//! capable agent in registration order, and walks workflow DAGs to
//! completion one ready layer at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore, broadcast};
use uuid::Uuid;

use crate::agent::{Agent, AgentStats};
use crate::config::OrchestratorConfig;
use crate::error::{AgentError, OrchestratorError, Result, WorkflowError};
use crate::events::ExecutionEvent;
use crate::task::{Task, TaskResult, TaskStatus};
use crate::workflow::Workflow;

/// Aggregate statistics across the agent pool.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub orchestrator_name: String,
    pub total_agents: usize,
    pub total_tasks_executed: usize,
    pub total_completed: usize,
    pub total_failed: usize,
    /// Percentage of completed tasks across all agents; 0.0 when none ran.
    pub overall_success_rate: f64,
    pub agent_statistics: Vec<AgentStats>,
    pub workflows_executed: usize,
}

/// Coordinates a pool of agents and executes workflows.
pub struct Orchestrator {
    config: OrchestratorConfig,
    agents: RwLock<Vec<Arc<Agent>>>,
    workflows: RwLock<HashMap<String, Workflow>>,
    workflows_executed: AtomicUsize,
    events: Option<broadcast::Sender<ExecutionEvent>>,
}

impl Orchestrator {
    /// Create a new orchestrator with an empty pool.
    pub fn new(config: OrchestratorConfig) -> Self {
        tracing::info!(orchestrator = %config.name, "Initialized orchestrator");
        Self {
            config,
            agents: RwLock::new(Vec::new()),
            workflows: RwLock::new(HashMap::new()),
            workflows_executed: AtomicUsize::new(0),
            events: None,
        }
    }

    /// Attach an execution event channel.
    pub fn with_events(mut self, events: broadcast::Sender<ExecutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Register an agent. Selection scans the pool in registration order,
    /// so routing is deterministic. Registering while a workflow is in
    /// flight is unsupported.
    pub async fn register(&self, agent: Arc<Agent>) {
        tracing::info!(
            orchestrator = %self.config.name,
            agent = %agent.name(),
            "Registered agent"
        );
        self.agents.write().await.push(agent);
    }

    /// Remove an agent from the pool. In-flight executions owned by the
    /// agent are not cancelled.
    pub async fn unregister(&self, id: Uuid) -> Option<Arc<Agent>> {
        let mut agents = self.agents.write().await;
        let index = agents.iter().position(|a| a.id() == id)?;
        let agent = agents.remove(index);
        tracing::info!(agent = %agent.name(), "Unregistered agent");
        Some(agent)
    }

    /// Look up a registered agent by ID.
    pub async fn agent(&self, id: Uuid) -> Option<Arc<Agent>> {
        self.agents.read().await.iter().find(|a| a.id() == id).cloned()
    }

    /// Select an agent for a task: the explicitly named one, or the first
    /// registered agent whose own capabilities match.
    pub async fn select_agent(
        &self,
        task: &Task,
        explicit_id: Option<Uuid>,
    ) -> Result<Arc<Agent>> {
        let agents = self.agents.read().await;
        match explicit_id {
            Some(id) => agents
                .iter()
                .find(|a| a.id() == id)
                .cloned()
                .ok_or_else(|| OrchestratorError::AgentNotFound { id }.into()),
            None => agents
                .iter()
                .find(|a| a.can_handle(task))
                .cloned()
                .ok_or_else(|| {
                    AgentError::Unroutable {
                        task_type: task.task_type.clone(),
                    }
                    .into()
                }),
        }
    }

    /// Route a task to an agent and execute it.
    pub async fn execute(&self, task: &mut Task, agent_id: Option<Uuid>) -> Result<TaskResult> {
        let agent = self.select_agent(task, agent_id).await?;
        tracing::info!(
            orchestrator = %self.config.name,
            agent = %agent.name(),
            task = %task.name,
            "Assigning task"
        );
        agent
            .execute_with_timeout(task, self.config.default_task_timeout)
            .await
    }

    /// Convert structural routing/execution errors into a failed result at
    /// the task's position.
    async fn execute_collected(&self, task: &mut Task) -> TaskResult {
        match self.execute(task, None).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(task = %task.name, error = %err, "Task failed structurally");
                if task.status == TaskStatus::InProgress {
                    let _ = task.mark_failed(err.to_string());
                }
                TaskResult::failure(err.to_string())
            }
        }
    }

    /// Execute a batch of independently-routed tasks, sequentially or with
    /// bounded parallelism. One result per input task, in input order; a
    /// failure never aborts the batch.
    pub async fn execute_batch(
        &self,
        tasks: &mut [Task],
        parallel: bool,
        max_concurrent: Option<usize>,
    ) -> Vec<TaskResult> {
        if !parallel {
            let mut results = Vec::with_capacity(tasks.len());
            for task in tasks.iter_mut() {
                results.push(self.execute_collected(task).await);
            }
            return results;
        }

        let limit = max_concurrent.unwrap_or(self.config.max_concurrent_tasks);
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let futures = tasks.iter_mut().map(|task| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok();
                self.execute_collected(task).await
            }
        });
        join_all(futures).await
    }

    /// Run one workflow step's tasks, returning the tasks (for the step to
    /// reclaim) alongside their results.
    async fn run_step(
        &self,
        step: &str,
        pinned: Option<Uuid>,
        mut tasks: Vec<Task>,
    ) -> (Vec<Task>, Vec<TaskResult>) {
        match pinned {
            Some(id) => match self.agent(id).await {
                Some(agent) => {
                    let results = agent.execute_batch(&mut tasks).await;
                    (tasks, results)
                }
                None => {
                    // A missing pinned agent fails the step's tasks but not
                    // the whole workflow.
                    let message = OrchestratorError::AgentNotFound { id }.to_string();
                    tracing::error!(step, error = %message, "Pinned agent missing");
                    let results = tasks.iter().map(|_| TaskResult::failure(&message)).collect();
                    (tasks, results)
                }
            },
            None => {
                let results = self
                    .execute_batch(&mut tasks, true, Some(self.config.max_concurrent_tasks))
                    .await;
                (tasks, results)
            }
        }
    }

    /// Execute a workflow to completion, one ready layer at a time.
    ///
    /// Steps in the same layer run concurrently with no ordering guarantee
    /// relative to each other. Fails with `WorkflowError::Stuck` when no
    /// step is ready while incomplete steps remain (a dependency cycle).
    pub async fn execute_workflow(
        &self,
        mut workflow: Workflow,
    ) -> Result<HashMap<String, Vec<TaskResult>>> {
        tracing::info!(workflow = %workflow.name(), "Starting workflow");
        self.workflows_executed.fetch_add(1, Ordering::SeqCst);
        self.emit(ExecutionEvent::WorkflowStarted {
            workflow: workflow.name().to_string(),
        });

        let workflow_name = workflow.name().to_string();
        let mut all_results = HashMap::new();

        while !workflow.is_completed() {
            let ready = workflow.ready_steps();
            if ready.is_empty() {
                let incomplete = workflow.incomplete_steps();
                tracing::error!(
                    workflow = %workflow.name(),
                    incomplete = ?incomplete,
                    "Workflow is stuck"
                );
                return Err(WorkflowError::Stuck {
                    workflow: workflow.name().to_string(),
                    incomplete,
                }
                .into());
            }

            let mut dispatch = Vec::with_capacity(ready.len());
            for name in &ready {
                if let Some(step) = workflow.step_mut(name) {
                    dispatch.push((name.clone(), step.agent_id, std::mem::take(&mut step.tasks)));
                }
            }

            let layer = dispatch.into_iter().map(|(name, pinned, tasks)| {
                let workflow = workflow_name.clone();
                async move {
                    tracing::info!(workflow = %workflow, step = %name, "Executing workflow step");
                    self.emit(ExecutionEvent::StepStarted {
                        workflow,
                        step: name.clone(),
                    });
                    let (tasks, results) = self.run_step(&name, pinned, tasks).await;
                    (name, tasks, results)
                }
            });

            for (name, tasks, results) in join_all(layer).await {
                if let Some(step) = workflow.step_mut(&name) {
                    step.tasks = tasks;
                    step.results = results.clone();
                }
                workflow.mark_step_completed(&name);
                self.emit(ExecutionEvent::StepCompleted {
                    workflow: workflow.name().to_string(),
                    step: name.clone(),
                });
                tracing::info!(step = %name, "Completed workflow step");
                all_results.insert(name, results);
            }
        }

        tracing::info!(workflow = %workflow.name(), "Workflow completed");
        self.emit(ExecutionEvent::WorkflowCompleted {
            workflow: workflow.name().to_string(),
        });
        self.workflows
            .write()
            .await
            .insert(workflow.name().to_string(), workflow);
        Ok(all_results)
    }

    /// A completed workflow retained after execution.
    pub async fn workflow_completed(&self, name: &str) -> bool {
        self.workflows.read().await.contains_key(name)
    }

    /// Aggregate statistics across every registered agent.
    pub async fn statistics(&self) -> OrchestratorStats {
        let agents = self.agents.read().await.clone();
        let mut agent_statistics = Vec::with_capacity(agents.len());
        for agent in &agents {
            agent_statistics.push(agent.statistics().await);
        }

        let total_tasks: usize = agent_statistics.iter().map(|s| s.total_tasks).sum();
        let total_completed: usize = agent_statistics.iter().map(|s| s.completed).sum();
        let total_failed: usize = agent_statistics.iter().map(|s| s.failed).sum();

        OrchestratorStats {
            orchestrator_name: self.config.name.clone(),
            total_agents: agents.len(),
            total_tasks_executed: total_tasks,
            total_completed,
            total_failed,
            overall_success_rate: if total_tasks > 0 {
                total_completed as f64 / total_tasks as f64 * 100.0
            } else {
                0.0
            },
            agent_statistics,
            workflows_executed: self.workflows_executed.load(Ordering::SeqCst),
        }
    }

    /// Connect every registered agent. One bad agent never blocks the rest.
    pub async fn connect_all(&self) {
        let agents = self.agents.read().await;
        tracing::info!(
            orchestrator = %self.config.name,
            count = agents.len(),
            "Connecting all agents"
        );
        for agent in agents.iter() {
            agent.connect();
        }
    }

    /// Disconnect every registered agent.
    pub async fn disconnect_all(&self) {
        let agents = self.agents.read().await;
        tracing::info!(
            orchestrator = %self.config.name,
            count = agents.len(),
            "Disconnecting all agents"
        );
        for agent in agents.iter() {
            agent.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::preset;
    use crate::error::{Error, ProviderError};
    use crate::provider::CapabilityProvider;
    use crate::workflow::WorkflowStep;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    struct EchoProvider;

    #[async_trait]
    impl CapabilityProvider for EchoProvider {
        async fn invoke(
            &self,
            operation: &str,
            _arguments: &Map<String, Value>,
        ) -> std::result::Result<Value, ProviderError> {
            Ok(json!({"operation": operation}))
        }
    }

    fn agent(name: &str, preset_name: &str) -> Arc<Agent> {
        Arc::new(Agent::new(
            name,
            preset(preset_name).unwrap(),
            Arc::new(EchoProvider) as Arc<dyn CapabilityProvider>,
        ))
    }

    async fn orchestrator_with(agents: &[Arc<Agent>]) -> Orchestrator {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        for a in agents {
            orchestrator.register(a.clone()).await;
        }
        orchestrator.connect_all().await;
        orchestrator
    }

    #[tokio::test]
    async fn explicit_id_must_resolve() {
        let orchestrator = orchestrator_with(&[agent("calc", "calculator")]).await;
        let mut task = Task::new("t", "d", "calculation");
        let err = orchestrator
            .execute(&mut task, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Orchestrator(OrchestratorError::AgentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn first_match_routing_is_deterministic() {
        let first = agent("first", "calculator");
        let second = agent("second", "calculator");
        let orchestrator = orchestrator_with(&[first.clone(), second.clone()]).await;

        let mut task = Task::new("t", "d", "calculation");
        let selected = orchestrator.select_agent(&task, None).await.unwrap();
        assert_eq!(selected.id(), first.id());

        orchestrator.execute(&mut task, None).await.unwrap();
        assert_eq!(task.assigned_agent_id, Some(first.id()));
    }

    #[tokio::test]
    async fn unregister_changes_routing() {
        let first = agent("first", "calculator");
        let second = agent("second", "calculator");
        let orchestrator = orchestrator_with(&[first.clone(), second.clone()]).await;

        orchestrator.unregister(first.id()).await.unwrap();
        let task = Task::new("t", "d", "calculation");
        let selected = orchestrator.select_agent(&task, None).await.unwrap();
        assert_eq!(selected.id(), second.id());
    }

    #[tokio::test]
    async fn no_capable_agent_is_unroutable() {
        let orchestrator = orchestrator_with(&[agent("calc", "calculator")]).await;
        let task = Task::new("t", "d", "weather");
        let err = orchestrator.select_agent(&task, None).await.unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::Unroutable { .. })));
    }

    #[tokio::test]
    async fn batch_isolates_routing_failures() {
        let orchestrator = orchestrator_with(&[agent("calc", "calculator")]).await;
        let mut tasks = vec![
            Task::new("ok", "d", "calculation"),
            Task::new("bad", "d", "weather"),
            Task::new("ok2", "d", "math"),
        ];

        let results = orchestrator.execute_batch(&mut tasks, false, None).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[2].success);

        let results = orchestrator.execute_batch(&mut tasks_reset(), true, Some(2)).await;
        assert_eq!(results.len(), 3);
        assert!(!results[1].success);
    }

    fn tasks_reset() -> Vec<Task> {
        vec![
            Task::new("ok", "d", "calculation"),
            Task::new("bad", "d", "weather"),
            Task::new("ok2", "d", "math"),
        ]
    }

    #[tokio::test]
    async fn workflow_cycle_is_stuck() {
        let orchestrator = orchestrator_with(&[agent("calc", "calculator")]).await;
        let workflow = Workflow::new(
            "cyclic",
            vec![
                WorkflowStep::new("x", vec![Task::new("t", "d", "calculation")])
                    .after(["y"]),
                WorkflowStep::new("y", vec![Task::new("t", "d", "calculation")])
                    .after(["x"]),
            ],
        )
        .unwrap();

        let err = orchestrator.execute_workflow(workflow).await.unwrap_err();
        match err {
            Error::Workflow(WorkflowError::Stuck { incomplete, .. }) => {
                assert_eq!(incomplete, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected stuck workflow, got {other}"),
        }
    }

    #[tokio::test]
    async fn pinned_step_with_missing_agent_fails_its_tasks_only() {
        let orchestrator = orchestrator_with(&[agent("calc", "calculator")]).await;
        let workflow = Workflow::new(
            "pinned",
            vec![
                WorkflowStep::new("ghost", vec![Task::new("t", "d", "calculation")])
                    .pinned_to(Uuid::new_v4()),
                WorkflowStep::new("real", vec![Task::new("t", "d", "calculation")])
                    .after(["ghost"]),
            ],
        )
        .unwrap();

        let results = orchestrator.execute_workflow(workflow).await.unwrap();
        assert!(!results["ghost"][0].success);
        assert!(
            results["ghost"][0]
                .error
                .as_deref()
                .unwrap()
                .contains("not registered")
        );
        assert!(results["real"][0].success);
    }

    #[tokio::test]
    async fn statistics_aggregate_pool() {
        let calc = agent("calc", "calculator");
        let weather = agent("weather", "weather");
        let orchestrator = orchestrator_with(&[calc, weather]).await;

        let mut tasks = vec![
            Task::new("a", "d", "calculation"),
            Task::new("b", "d", "weather"),
        ];
        orchestrator.execute_batch(&mut tasks, false, None).await;

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.total_tasks_executed, 2);
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.overall_success_rate, 100.0);
        assert_eq!(stats.agent_statistics.len(), 2);
        assert_eq!(stats.workflows_executed, 0);
    }
}
