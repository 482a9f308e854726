//! Task entity and state machine.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::TaskError;

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be executed.
    Pending,
    /// Task is currently being executed.
    InProgress,
    /// Task finished successfully.
    Completed,
    /// Task failed and will not be retried.
    Failed,
    /// Task was cancelled before reaching a result.
    Cancelled,
}

impl TaskStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, InProgress) | (Pending, Cancelled) |
            // From InProgress
            (InProgress, Completed) | (InProgress, Failed) | (InProgress, Cancelled) |
            // From Failed: retry grant, or restart of the retried attempt
            (Failed, Pending) | (Failed, InProgress)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task priority. Informational metadata only: nothing in the scheduler
/// orders or preempts by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Result of a task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the task completed successfully.
    pub success: bool,
    /// Result payload on success. A payload may describe a business-level
    /// error (e.g. division by zero) and still count as a success here.
    pub data: Option<Value>,
    /// Error message, present iff not success.
    pub error: Option<String>,
    /// Wall-clock execution time, when both start and end were observed.
    pub execution_time: Option<Duration>,
    /// Additional metadata (executing agent, operation used).
    pub metadata: HashMap<String, Value>,
}

impl TaskResult {
    /// Build a successful result with a payload.
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time: None,
            metadata: HashMap::new(),
        }
    }

    /// Build a failed result with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach an execution time.
    pub fn with_execution_time(mut self, time: Option<Duration>) -> Self {
        self.execution_time = time;
        self
    }

    /// Record which agent produced this result and through which operation.
    pub fn executed_by(mut self, agent_id: Uuid, agent_name: &str, operation: &str) -> Self {
        self.metadata
            .insert("agent_id".into(), Value::String(agent_id.to_string()));
        self.metadata
            .insert("agent_name".into(), Value::String(agent_name.to_string()));
        self.metadata
            .insert("operation".into(), Value::String(operation.to_string()));
        self
    }
}

/// A unit of work routed to an agent by its `task_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID, generated at creation.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Match key for capability routing.
    pub task_type: String,
    /// Opaque parameters, interpreted only by the capability operation.
    pub parameters: Map<String, Value>,
    /// Informational priority.
    pub priority: TaskPriority,
    /// Current status.
    pub status: TaskStatus,
    /// Result, set only on completion or failure.
    pub result: Option<TaskResult>,
    /// Parent task ID for delegation provenance.
    pub parent_task_id: Option<Uuid>,
    /// Agent that took ownership of the task.
    pub assigned_agent_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on transition to in_progress.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on transition to a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Maximum retry attempts after a fault.
    pub max_retries: u32,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Optional execution deadline.
    pub timeout: Option<Duration>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            task_type: task_type.into(),
            parameters: Map::new(),
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            result: None,
            parent_task_id: None,
            assigned_agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            max_retries: 3,
            retry_count: 0,
            timeout: None,
        }
    }

    /// Set the task parameters.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the execution deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record delegation provenance.
    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    fn transition_to(&mut self, target: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Mark the task as started. Valid from pending or failed (a granted
    /// retry re-invokes this before the next attempt).
    pub fn mark_started(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as completed with a result.
    pub fn mark_completed(&mut self, result: TaskResult) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as failed, synthesizing a failed result.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Failed)?;
        self.result = Some(TaskResult::failure(error));
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel the task. Valid from any non-terminal status.
    pub fn mark_cancelled(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Cancelled)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Check whether a retry may still be granted.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Consume a retry slot and return the task to pending. The terminal
    /// result and timestamp are intentionally left in place; callers must
    /// re-invoke `mark_started` before the next attempt.
    pub fn increment_retry(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Pending)?;
        self.retry_count += 1;
        self.result = None;
        Ok(())
    }

    /// Wall-clock execution time; defined only when both the start and
    /// completion timestamps are set.
    pub fn execution_time(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}
