//! Event and progress types emitted by the agent loop.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::ToolCall;
use crate::tool::ToolResult;

/// One event from [`crate::agent::Agent::execute_stream`].
///
/// Per iteration the loop emits `Iteration`, then `Thought` fragments as the
/// model streams text, then a `ToolCall`/`ToolResult` pair per requested
/// call. A text-only model response produces a terminal `Response` followed
/// by `Done`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Iteration {
        iteration: usize,
        max_iterations: usize,
    },
    Thought {
        text: String,
    },
    ToolCall {
        call: ToolCall,
    },
    ToolResult {
        result: ToolResult,
    },
    Response {
        text: String,
    },
    Done {
        iterations: usize,
    },
}

/// Progress notification handed to the owner of a task execution.
///
/// This is a one-way channel: the agent fires notifications and never reads
/// execution state back, so the orchestrator retains exclusive ownership of
/// its [`crate::orchestration::TaskExecution`] records.
#[derive(Clone, Debug)]
pub enum AgentProgress {
    IterationStarted {
        iteration: usize,
        max_iterations: usize,
    },
    ToolStarted {
        name: String,
    },
    ToolCompleted {
        name: String,
    },
}

/// Shared progress callback. Cheap to clone; invoked synchronously at
/// iteration and tool boundaries.
pub type ProgressFn = Arc<dyn Fn(AgentProgress) + Send + Sync>;
