//! Orchestration subsystem: objective planning, task types, and the
//! top-level [`orchestrator::Orchestrator`] coordinator.

pub mod orchestrator;
pub mod planner;
pub mod types;

pub use orchestrator::{Orchestrator, OrchestratorResult};
pub use planner::{DecomposedPlan, PlannedTask};
pub use types::{
    Task, TaskExecution, TaskStatus, WorkflowMode, META_AGENT_ID, META_AGENT_ROLE,
    META_REQUIRED_CAPABILITIES,
};
