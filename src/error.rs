use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors raised by a [`crate::backend::ModelBackend`] implementation.
///
/// These propagate out of the agent loop as a failed task execution, which
/// makes them eligible for orchestrator-level retry.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Model stream ended unexpectedly: {0}")]
    StreamInterrupted(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Errors raised while executing a single tool call.
///
/// The agent loop catches these per call and converts them into failed
/// [`crate::tool::ToolResult`]s; they never abort an iteration.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailed { tool: String, message: String },
}

/// Errors related to the agent conversation loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Model backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Agent '{agent_id}' received an empty task prompt")]
    EmptyPrompt { agent_id: String },
}

/// Errors produced by the task router.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("No eligible agent for task '{task_id}'")]
    NoEligibleAgent { task_id: String },

    #[error("Routing rule '{rule}' has an invalid pattern: {message}")]
    InvalidRulePattern { rule: String, message: String },

    #[error("Agent '{agent_id}' is not registered")]
    UnknownAgent { agent_id: String },
}

/// Errors surfaced by [`crate::orchestration::Orchestrator::execute`].
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Routing failed for task '{task_id}': {source}")]
    RoutingFailed {
        task_id: String,
        #[source]
        source: RoutingError,
    },

    #[error("Task '{task_id}' timed out after {timeout_ms}ms")]
    TaskTimeout { task_id: String, timeout_ms: u64 },

    #[error("Task '{task_id}' failed after {attempts} attempt(s): {message}")]
    TaskFailed {
        task_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Orchestration cancelled")]
    Cancelled,
}
