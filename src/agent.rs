//! Agent execution and delegation.
//!
//! An agent executes a task directly when one of its own capabilities
//! matches the task type, or hands it to the first registered sub-agent
//! that can handle it. Provider faults are retried with an explicit
//! bounded loop; exhausted retries surface as a failed `TaskResult`,
//! never as an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore, broadcast};
use uuid::Uuid;

use crate::capability::Capability;
use crate::error::{AgentError, Error, Result};
use crate::events::ExecutionEvent;
use crate::provider::CapabilityProvider;
use crate::task::{Task, TaskResult, TaskStatus};

/// Point-in-time statistics derived from an agent's execution history.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    /// Percentage of completed tasks; 0.0 when the history is empty.
    pub success_rate: f64,
    /// Mean execution time over completed tasks with a defined time.
    pub avg_execution_time: Option<Duration>,
    pub subagent_count: usize,
}

/// A worker that executes tasks through a capability provider.
pub struct Agent {
    id: Uuid,
    name: String,
    capabilities: Vec<Capability>,
    provider: Arc<dyn CapabilityProvider>,
    subagents: RwLock<Vec<Arc<Agent>>>,
    history: RwLock<Vec<Task>>,
    connected: AtomicBool,
    events: Option<broadcast::Sender<ExecutionEvent>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create a new disconnected agent.
    pub fn new(
        name: impl Into<String>,
        capabilities: Vec<Capability>,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        tracing::info!(agent_id = %id, agent = %name, "Initialized agent");
        Self {
            id,
            name,
            capabilities,
            provider,
            subagents: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            events: None,
        }
    }

    /// Attach an execution event channel.
    pub fn with_events(mut self, events: broadcast::Sender<ExecutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Mark the agent connected. Connecting twice is a logged no-op.
    pub fn connect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            tracing::warn!(agent = %self.name, "Agent is already connected");
        } else {
            tracing::info!(agent = %self.name, "Agent connected");
        }
    }

    /// Mark the agent disconnected. Disconnecting twice is a no-op.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!(agent = %self.name, "Agent disconnected");
        }
    }

    /// Register a sub-agent for delegation. Delegation scans sub-agents in
    /// registration order.
    pub async fn register_subagent(&self, subagent: Arc<Agent>) {
        tracing::info!(
            agent = %self.name,
            subagent = %subagent.name,
            "Registered sub-agent"
        );
        self.subagents.write().await.push(subagent);
    }

    /// Check whether one of this agent's own capabilities serves the task
    /// type. Sub-agents are not considered.
    pub fn can_handle(&self, task: &Task) -> bool {
        self.capabilities.iter().any(|cap| cap.matches(task))
    }

    /// First capability matching the task type.
    fn capability_for(&self, task: &Task) -> Option<&Capability> {
        self.capabilities.iter().find(|cap| cap.matches(task))
    }

    /// Execute a task, delegating or retrying as needed.
    ///
    /// Returns `Err` only for structural problems (`NotConnected`,
    /// `Unroutable`); provider faults are retried up to the task's
    /// `max_retries` and then returned as a failed `TaskResult`.
    pub async fn execute(&self, task: &mut Task) -> Result<TaskResult> {
        self.execute_inner(task).await
    }

    // Boxed for delegation recursion down the sub-agent tree.
    fn execute_inner<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a, Result<TaskResult>> {
        Box::pin(async move {
            loop {
                if !self.is_connected() {
                    return Err(AgentError::NotConnected {
                        name: self.name.clone(),
                    }
                    .into());
                }

                // A delegating parent has already marked the task started;
                // do not re-enter in_progress.
                if task.status != TaskStatus::InProgress {
                    task.mark_started().map_err(Error::from)?;
                }
                task.assigned_agent_id = Some(self.id);
                self.emit(ExecutionEvent::TaskStarted {
                    task_id: task.id,
                    agent_id: self.id,
                    attempt: task.retry_count + 1,
                });
                tracing::info!(
                    agent = %self.name,
                    task = %task.name,
                    task_id = %task.id,
                    attempt = task.retry_count + 1,
                    "Executing task"
                );

                let Some(capability) = self.capability_for(task).cloned() else {
                    return self.delegate(task).await;
                };

                match self
                    .provider
                    .invoke(&capability.operation, &task.parameters)
                    .await
                {
                    Ok(payload) => {
                        let mut result = TaskResult::success(payload).executed_by(
                            self.id,
                            &self.name,
                            &capability.operation,
                        );
                        task.mark_completed(result.clone()).map_err(Error::from)?;
                        result.execution_time = task.execution_time();
                        if let Some(stored) = task.result.as_mut() {
                            stored.execution_time = result.execution_time;
                        }
                        self.history.write().await.push(task.clone());
                        self.emit(ExecutionEvent::TaskCompleted {
                            task_id: task.id,
                            agent_id: self.id,
                        });
                        tracing::info!(task = %task.name, "Task completed");
                        return Ok(result);
                    }
                    Err(fault) => {
                        let message = format!(
                            "Operation {} failed for task {}: {fault}",
                            capability.operation, task.name
                        );
                        tracing::warn!(
                            agent = %self.name,
                            task = %task.name,
                            error = %fault,
                            "Task execution fault"
                        );
                        task.mark_failed(&message).map_err(Error::from)?;

                        if task.can_retry() {
                            task.increment_retry().map_err(Error::from)?;
                            self.emit(ExecutionEvent::TaskRetried {
                                task_id: task.id,
                                retry_count: task.retry_count,
                                error: message,
                            });
                            tracing::info!(
                                task = %task.name,
                                retry = task.retry_count,
                                "Retrying task"
                            );
                            continue;
                        }

                        self.history.write().await.push(task.clone());
                        self.emit(ExecutionEvent::TaskFailed {
                            task_id: task.id,
                            error: message.clone(),
                        });
                        let time = task.execution_time();
                        return Ok(TaskResult::failure(message).with_execution_time(time));
                    }
                }
            }
        })
    }

    /// Hand the task to the first sub-agent that can handle it. The
    /// sub-agent owns the retry loop; its terminal result is returned
    /// as-is, and this agent records its participation in history.
    async fn delegate(&self, task: &mut Task) -> Result<TaskResult> {
        let subagent = {
            let subagents = self.subagents.read().await;
            subagents.iter().find(|sub| sub.can_handle(task)).cloned()
        };

        let Some(subagent) = subagent else {
            return Err(AgentError::Unroutable {
                task_type: task.task_type.clone(),
            }
            .into());
        };

        tracing::info!(
            agent = %self.name,
            subagent = %subagent.name,
            task = %task.name,
            "Delegating task"
        );
        self.emit(ExecutionEvent::TaskDelegated {
            task_id: task.id,
            from_agent: self.id,
            to_agent: subagent.id,
        });

        let result = subagent.execute_inner(task).await?;
        self.history.write().await.push(task.clone());
        Ok(result)
    }

    /// Execute with a deadline: the explicit argument, else the task's own
    /// timeout, else none. Expiry aborts the attempt, marks the task
    /// failed, and consumes no retry.
    pub async fn execute_with_timeout(
        &self,
        task: &mut Task,
        timeout: Option<Duration>,
    ) -> Result<TaskResult> {
        let Some(deadline) = timeout.or(task.timeout) else {
            return self.execute(task).await;
        };

        match tokio::time::timeout(deadline, self.execute_inner(task)).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("Task {} timed out after {deadline:?}", task.name);
                tracing::warn!(agent = %self.name, task = %task.name, "Task timed out");
                // The aborted attempt may have been between retries.
                if task.status == TaskStatus::Pending {
                    task.mark_started().map_err(Error::from)?;
                }
                task.mark_failed(&message).map_err(Error::from)?;
                self.emit(ExecutionEvent::TaskFailed {
                    task_id: task.id,
                    error: message.clone(),
                });
                Ok(TaskResult::failure(message))
            }
        }
    }

    /// Convert a structural error into a failed result at the task's
    /// position; batches never abort early.
    async fn execute_collected(&self, task: &mut Task) -> TaskResult {
        match self.execute_inner(task).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    agent = %self.name,
                    task = %task.name,
                    error = %err,
                    "Task failed structurally"
                );
                if task.status == TaskStatus::InProgress {
                    let _ = task.mark_failed(err.to_string());
                }
                TaskResult::failure(err.to_string())
            }
        }
    }

    /// Execute tasks sequentially; results are in input order and one
    /// failure does not halt the batch.
    pub async fn execute_batch(&self, tasks: &mut [Task]) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks.iter_mut() {
            results.push(self.execute_collected(task).await);
        }
        results
    }

    /// Execute tasks with at most `max_concurrent` in flight. Results are
    /// reindexed to input order regardless of completion order.
    pub async fn execute_batch_parallel(
        &self,
        tasks: &mut [Task],
        max_concurrent: usize,
    ) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let futures = tasks.iter_mut().map(|task| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok();
                self.execute_collected(task).await
            }
        });
        join_all(futures).await
    }

    /// Snapshot of the execution history.
    pub async fn history(&self) -> Vec<Task> {
        self.history.read().await.clone()
    }

    /// Statistics derived from the execution history.
    pub async fn statistics(&self) -> AgentStats {
        let history = self.history.read().await;
        let total = history.len();
        let completed = history
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = history
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();

        let times: Vec<Duration> = history
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(Task::execution_time)
            .collect();
        let avg_execution_time = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<Duration>() / times.len() as u32)
        };

        AgentStats {
            agent_id: self.id,
            agent_name: self.name.clone(),
            total_tasks: total,
            completed,
            failed,
            success_rate: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_execution_time,
            subagent_count: self.subagents.read().await.len(),
        }
    }
}
