//! Multi-step workflows with dependency edges.
//!
//! A workflow is a named DAG of task groups. A step becomes ready when
//! every step it depends on is completed; the orchestrator dispatches
//! ready steps layer by layer.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::WorkflowError;
use crate::task::{Task, TaskResult};

/// A group of tasks executed together once its dependencies complete.
#[derive(Debug)]
pub struct WorkflowStep {
    /// Step name, unique within the workflow.
    pub name: String,
    /// Tasks executed when the step runs.
    pub tasks: Vec<Task>,
    /// Pinned agent ID; bypasses capability matching when set.
    pub agent_id: Option<Uuid>,
    /// Names of steps that must complete before this one runs.
    pub depends_on: Vec<String>,
    /// Whether the step has run.
    pub completed: bool,
    /// Results produced when the step ran, in task order.
    pub results: Vec<TaskResult>,
}

impl WorkflowStep {
    /// Create a step with no dependencies and auto-selected agents.
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
            agent_id: None,
            depends_on: Vec::new(),
            completed: false,
            results: Vec::new(),
        }
    }

    /// Route every task in this step to a specific agent.
    pub fn pinned_to(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Declare dependency steps.
    pub fn after<I, S>(mut self, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = depends_on.into_iter().map(Into::into).collect();
        self
    }
}

/// A named DAG of workflow steps.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    steps: HashMap<String, WorkflowStep>,
    completed_steps: HashSet<String>,
}

impl Workflow {
    /// Build a workflow, validating the step graph: duplicate step names
    /// and dependencies on unknown steps are construction errors, not
    /// runtime scheduling errors.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Result<Self, WorkflowError> {
        let mut map = HashMap::with_capacity(steps.len());
        for step in steps {
            if map.contains_key(&step.name) {
                return Err(WorkflowError::DuplicateStep { step: step.name });
            }
            map.insert(step.name.clone(), step);
        }

        for step in map.values() {
            for dep in &step.depends_on {
                if !map.contains_key(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name: name.into(),
            steps: map,
            completed_steps: HashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.get(name)
    }

    pub(crate) fn step_mut(&mut self, name: &str) -> Option<&mut WorkflowStep> {
        self.steps.get_mut(name)
    }

    /// Names of steps whose dependencies are all completed and which have
    /// not yet run. No ordering is guaranteed within the ready set.
    pub fn ready_steps(&self) -> Vec<String> {
        self.steps
            .values()
            .filter(|step| !step.completed)
            .filter(|step| {
                step.depends_on
                    .iter()
                    .all(|dep| self.completed_steps.contains(dep))
            })
            .map(|step| step.name.clone())
            .collect()
    }

    /// Names of steps that have not completed.
    pub fn incomplete_steps(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .steps
            .values()
            .filter(|step| !step.completed)
            .map(|step| step.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Mark a step completed, adding it to the completed set.
    pub fn mark_step_completed(&mut self, name: &str) {
        if let Some(step) = self.steps.get_mut(name) {
            step.completed = true;
            self.completed_steps.insert(name.to_string());
        }
    }

    /// Whether every step has completed.
    pub fn is_completed(&self) -> bool {
        self.completed_steps.len() == self.steps.len()
    }
}
