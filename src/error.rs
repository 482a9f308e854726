//! Error types for the orchestration core.

use uuid::Uuid;

use crate::task::TaskStatus;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Task state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Agent execution errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {name} is not connected")]
    NotConnected { name: String },

    #[error("No capability or sub-agent handles task type {task_type}")]
    Unroutable { task_type: String },
}

/// Orchestrator-level errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Agent {id} is not registered")]
    AgentNotFound { id: Uuid },
}

/// Workflow construction and scheduling errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Duplicate step name: {step}")]
    DuplicateStep { step: String },

    #[error("Workflow {workflow} is stuck; incomplete steps: {incomplete:?}")]
    Stuck {
        workflow: String,
        incomplete: Vec<String>,
    },
}

/// Capability provider errors.
///
/// Any of these is a fault: the agent layer retries it. A business-level
/// error described inside a successful invocation payload is not a
/// `ProviderError` and is never retried.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Operation {operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
