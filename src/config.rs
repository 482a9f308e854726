//! Configuration types.

use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Orchestrator name for identification.
    pub name: String,
    /// Concurrency limit for bounded-parallel batches and unpinned
    /// workflow steps.
    pub max_concurrent_tasks: usize,
    /// Deadline applied to single-task executions when the task carries
    /// no timeout of its own. `None` means no deadline.
    pub default_task_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: "orchestrator".to_string(),
            max_concurrent_tasks: 5,
            default_task_timeout: None,
        }
    }
}
