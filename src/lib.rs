//! In-process multi-agent task orchestration: typed tasks with a strict
//! lifecycle, capability-routed agents with delegation and bounded
//! retries, and dependency-ordered workflows.

pub mod agent;
pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod provider;
pub mod task;
pub mod workflow;
