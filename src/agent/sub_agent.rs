//! Specialized agent wrapper consumed by the task router.
//!
//! [`SubAgent`] adds a specialization label, a capability list, a priority
//! weight, and a concurrency ceiling on top of [`Agent`]. The active-task set
//! is released by a drop guard, so a failed or cancelled execution (timeouts
//! drop the future mid-flight) never leaks a permanently busy slot.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;

use crate::agent::events::ProgressFn;
use crate::agent::runner::{Agent, AgentResult};
use crate::error::AgentError;
use crate::orchestration::Task;

/// Default concurrency ceiling for a sub-agent.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
/// Default routing priority (mid-scale on 0-10).
pub const DEFAULT_PRIORITY: u8 = 5;

/// Load snapshot consumed by the router's load-aware scoring.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AgentLoad {
    pub active: usize,
    pub max: usize,
    /// `active / max`, in `[0, 1]` while the ceiling is respected.
    pub utilization: f64,
}

/// An [`Agent`] augmented with routing attributes and a concurrency limit.
pub struct SubAgent {
    agent: Agent,
    role: String,
    capabilities: Vec<String>,
    priority: u8,
    max_concurrent: usize,
    active: Mutex<HashSet<String>>,
}

impl SubAgent {
    pub fn new(agent: Agent, role: impl Into<String>) -> Self {
        Self {
            agent,
            role: role.into(),
            capabilities: Vec::new(),
            priority: DEFAULT_PRIORITY,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn id(&self) -> &str {
        self.agent.id()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Whether this sub-agent can accept the task right now.
    ///
    /// False when the active-task count has reached the ceiling, or when the
    /// task declares a required capability this sub-agent lacks.
    pub fn can_handle(&self, task: &Task) -> bool {
        if self.active.lock().unwrap().len() >= self.max_concurrent {
            return false;
        }
        task.required_capabilities()
            .iter()
            .all(|needed| self.capabilities.iter().any(|c| c == needed))
    }

    /// Current load snapshot.
    pub fn load(&self) -> AgentLoad {
        let active = self.active.lock().unwrap().len();
        AgentLoad {
            active,
            max: self.max_concurrent,
            utilization: active as f64 / self.max_concurrent as f64,
        }
    }

    /// Run the task through the underlying agent loop, holding an active
    /// slot for the duration. The slot is released on every exit path,
    /// including cancellation.
    pub async fn execute(
        &self,
        task: &Task,
        progress: Option<ProgressFn>,
    ) -> Result<AgentResult, AgentError> {
        self.active.lock().unwrap().insert(task.id.clone());
        let _guard = ActiveGuard {
            active: &self.active,
            task_id: &task.id,
        };

        tracing::debug!(agent_id = %self.id(), task_id = %task.id, "sub-agent executing");
        self.agent.execute(task, progress).await
    }

    /// Clear the underlying agent's conversation memory.
    pub fn reset(&self) {
        self.agent.reset();
    }

    /// Occupy an active slot without running anything. Lets router tests pin
    /// a load snapshot deterministically.
    #[cfg(test)]
    pub(crate) fn occupy_slot(&self, task_id: &str) {
        self.active.lock().unwrap().insert(task_id.to_string());
    }
}

/// Removes the task id from the active set when dropped.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashSet<String>>,
    task_id: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(self.task_id);
    }
}
