//! Capability declarations and named presets.
//!
//! A capability maps a task type to the named external operation that
//! serves it. Agents are composed from capability lists; the presets here
//! cover the common specializations so callers do not need bespoke agent
//! types per specialty.

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// A declared (task_type → operation) mapping owned by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Task type this capability handles.
    pub task_type: String,
    /// Name of the external operation to invoke.
    pub operation: String,
    /// Human-readable description.
    pub description: String,
}

impl Capability {
    /// Create a new capability.
    pub fn new(
        task_type: impl Into<String>,
        operation: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            operation: operation.into(),
            description: description.into(),
        }
    }

    /// Check whether this capability serves the task's type.
    pub fn matches(&self, task: &Task) -> bool {
        self.task_type == task.task_type
    }
}

/// Look up a named capability-set preset.
///
/// Returns `None` for an unknown preset name. The sets mirror the built-in
/// provider operations: `calculator`, `file-ops`, `weather`, `timestamp`,
/// and the combined `data-processing` set.
pub fn preset(name: &str) -> Option<Vec<Capability>> {
    let caps = match name {
        "calculator" => vec![
            Capability::new("calculation", "calculator", "Perform mathematical calculations"),
            Capability::new("math", "calculator", "Mathematical operations"),
        ],
        "file-ops" => vec![
            Capability::new("file_read", "file_operations", "Read files from the filesystem"),
            Capability::new("file_write", "file_operations", "Write files to the filesystem"),
            Capability::new("file_list", "file_operations", "List directory contents"),
            Capability::new("file_exists", "file_operations", "Check file existence"),
        ],
        "weather" => vec![Capability::new(
            "weather",
            "weather",
            "Get weather information for cities",
        )],
        "timestamp" => vec![Capability::new(
            "timestamp",
            "timestamp",
            "Get the current timestamp in various formats",
        )],
        "data-processing" => vec![
            Capability::new("calculation", "calculator", "Perform calculations on data"),
            Capability::new("file_read", "file_operations", "Read data files"),
            Capability::new("file_write", "file_operations", "Write processed data"),
        ],
        _ => return None,
    };
    Some(caps)
}
