//! Execution event stream.
//!
//! Agents and the orchestrator broadcast `ExecutionEvent`s through an
//! injected channel so embedders can observe execution without scraping
//! logs. Sends are fire-and-forget: with no subscribers the events are
//! dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity for an event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted during task and workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// An agent began an execution attempt.
    TaskStarted {
        task_id: Uuid,
        agent_id: Uuid,
        attempt: u32,
    },
    /// A task was handed to a sub-agent.
    TaskDelegated {
        task_id: Uuid,
        from_agent: Uuid,
        to_agent: Uuid,
    },
    /// A retry was granted after a fault.
    TaskRetried {
        task_id: Uuid,
        retry_count: u32,
        error: String,
    },
    /// A task finished successfully.
    TaskCompleted { task_id: Uuid, agent_id: Uuid },
    /// A task failed with retries exhausted, or timed out.
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    /// A workflow run began.
    WorkflowStarted { workflow: String },
    /// A workflow step was dispatched.
    StepStarted { workflow: String, step: String },
    /// A workflow step finished and its results were recorded.
    StepCompleted { workflow: String, step: String },
    /// A workflow run finished with every step completed.
    WorkflowCompleted { workflow: String },
}

impl ExecutionEvent {
    /// Whether this event ends a task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCompleted { .. } | Self::TaskFailed { .. })
    }
}

/// Create an event channel with the default capacity.
pub fn channel() -> (
    broadcast::Sender<ExecutionEvent>,
    broadcast::Receiver<ExecutionEvent>,
) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
