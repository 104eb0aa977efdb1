//! Type definitions shared across the orchestration subsystem.
//!
//! These form the vocabulary between the [`super::orchestrator::Orchestrator`],
//! the [`crate::routing::TaskRouter`], and executing agents. All types derive
//! [`serde::Serialize`] so hosts can expose execution state as JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// Metadata key naming an explicit agent assignment (router tier 1).
pub const META_AGENT_ID: &str = "agent_id";
/// Metadata key carrying the planner's intended specialization (routing hint).
pub const META_AGENT_ROLE: &str = "agent_role";
/// Metadata key declaring capabilities the executing agent must have.
pub const META_REQUIRED_CAPABILITIES: &str = "required_capabilities";

/// One unit of work submitted for routing and execution.
///
/// Immutable once dispatched: the orchestrator builds enriched clones per
/// workflow step rather than mutating a shared task in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Key-value context merged in by conditional workflows.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    /// Routing hints and host-defined annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Truncated outputs of earlier tasks, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_outputs: Vec<String>,
    /// Snapshot of the registry visible to this task at dispatch time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existing_artifacts: Vec<Artifact>,
}

impl Task {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            parent_task_id: None,
            context: HashMap::new(),
            metadata: HashMap::new(),
            previous_outputs: Vec::new(),
            existing_artifacts: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// The explicitly-assigned agent id, if the host set one.
    pub fn assigned_agent_id(&self) -> Option<&str> {
        self.metadata.get(META_AGENT_ID).and_then(|v| v.as_str())
    }

    /// The planner's intended specialization, if any.
    pub fn agent_role(&self) -> Option<&str> {
        self.metadata.get(META_AGENT_ROLE).and_then(|v| v.as_str())
    }

    /// Capabilities the executing agent must provide. Accepts either a JSON
    /// array of strings or a single string under the metadata key.
    pub fn required_capabilities(&self) -> Vec<String> {
        match self.metadata.get(META_REQUIRED_CAPABILITIES) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Lifecycle of one attempt at running a task on an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Tracks one task's execution on an agent.
///
/// Created when the task enters the router, mutated via the executing
/// agent's progress callback, finalized on completion, failure, or timeout.
/// Owned exclusively by the orchestrator; agents never hold a reference.
#[derive(Clone, Debug, Serialize)]
pub struct TaskExecution {
    pub task_id: String,
    pub agent_id: String,
    /// ISO 8601 timestamp when the attempt started.
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: TaskStatus,
    pub retries: u32,
    pub current_iteration: Option<usize>,
    pub max_iterations: Option<usize>,
    /// Name of the tool currently executing, if any.
    pub current_tool_call: Option<String>,
    /// Names of tools that have completed, in execution order.
    pub completed_tool_calls: Vec<String>,
    pub error: Option<String>,
}

impl TaskExecution {
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            status: TaskStatus::Pending,
            retries: 0,
            current_iteration: None,
            max_iterations: None,
            current_tool_call: None,
            completed_tool_calls: Vec::new(),
            error: None,
        }
    }
}

/// Strategy used to execute the tasks derived from a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// One task at a time, each seeing truncated outputs of all earlier tasks.
    Sequential,
    /// Batches of concurrent tasks; artifacts merge at batch boundaries.
    Parallel,
    /// Sequential plus a merged key-value context from all prior outputs.
    Conditional,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_capabilities_reads_array_and_string_forms() {
        let task = Task::new("t1", "do it")
            .with_metadata(META_REQUIRED_CAPABILITIES, json!(["rust", "testing"]));
        assert_eq!(task.required_capabilities(), vec!["rust", "testing"]);

        let task =
            Task::new("t2", "do it").with_metadata(META_REQUIRED_CAPABILITIES, json!("deploy"));
        assert_eq!(task.required_capabilities(), vec!["deploy"]);

        let task = Task::new("t3", "do it");
        assert!(task.required_capabilities().is_empty());
    }

    #[test]
    fn assigned_agent_id_reads_metadata() {
        let task = Task::new("t1", "x").with_metadata(META_AGENT_ID, json!("debugger"));
        assert_eq!(task.assigned_agent_id(), Some("debugger"));
        assert_eq!(task.agent_role(), None);
    }
}
