//! Tool set capability interface and the composite tool set.
//!
//! Concrete tool implementations (file I/O, shell, web) live in the host;
//! the core only needs three operations: list definitions, check presence,
//! and execute a call. Tool failures are data, not control flow -- the agent
//! loop converts an `Err` from [`ToolSet::execute`] into a failed
//! [`ToolResult`] so the model can observe the error and react.

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactDraft;
use crate::backend::ToolCall;
use crate::error::ToolError;

/// Schema descriptor for one callable tool, as advertised to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Outcome of executing one tool call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    /// Output payload handed back to the model.
    pub output: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// A file-like output the tool produced, if any. Collected by the agent
    /// and folded into the artifact registry by the orchestrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactDraft>,
}

impl ToolResult {
    /// A successful result with the given output payload.
    pub fn ok(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            output: output.into(),
            success: true,
            error: None,
            artifact: None,
        }
    }

    /// A failed result. The error text doubles as the model-visible output.
    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            output: format!("Error: {error}"),
            success: false,
            error: Some(error),
            artifact: None,
        }
    }

    /// Attach an artifact draft to this result.
    pub fn with_artifact(mut self, artifact: ArtifactDraft) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// Capability interface over a set of callable tools.
#[async_trait::async_trait]
pub trait ToolSet: Send + Sync {
    /// Schemas for every tool this set exposes.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether this set declares a tool with the given name.
    fn has_tool(&self, name: &str) -> bool {
        self.definitions().iter().any(|d| d.name == name)
    }

    /// Execute one call. Implementations should return `Err` for unknown
    /// tools and execution failures; the agent loop wraps either into a
    /// failed [`ToolResult`].
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError>;
}

/// An empty tool set, for agents that only converse.
pub struct NoTools;

#[async_trait::async_trait]
impl ToolSet for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        Err(ToolError::UnknownTool(call.name.clone()))
    }
}

/// Aggregates several tool sets behind the [`ToolSet`] interface.
///
/// Later-registered children shadow earlier ones on name collision: both
/// `definitions` and `execute` resolve a name to the last child declaring
/// it.
pub struct CompositeToolSet {
    children: Vec<Box<dyn ToolSet>>,
}

impl CompositeToolSet {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Register a child set. Registration order defines shadowing: the last
    /// child to declare a name wins.
    pub fn push(&mut self, set: Box<dyn ToolSet>) {
        self.children.push(set);
    }

    pub fn with(mut self, set: Box<dyn ToolSet>) -> Self {
        self.push(set);
        self
    }
}

impl Default for CompositeToolSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolSet for CompositeToolSet {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = Vec::new();
        for child in &self.children {
            for def in child.definitions() {
                if let Some(existing) = defs.iter_mut().find(|d| d.name == def.name) {
                    *existing = def;
                } else {
                    defs.push(def);
                }
            }
        }
        defs
    }

    fn has_tool(&self, name: &str) -> bool {
        self.children.iter().any(|c| c.has_tool(name))
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        for child in self.children.iter().rev() {
            if child.has_tool(&call.name) {
                return child.execute(call).await;
            }
        }
        Err(ToolError::UnknownTool(call.name.clone()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{BrokenTool, EchoTool};
    use super::*;
    use crate::backend::ToolCall;
    use serde_json::json;

    fn call(name: &str, text: &str) -> ToolCall {
        ToolCall::new("c1", name, json!({"text": text}))
    }

    #[tokio::test]
    async fn composite_dispatches_to_declaring_child() {
        let set = CompositeToolSet::new()
            .with(Box::new(EchoTool::named("alpha")))
            .with(Box::new(EchoTool::named("beta")));

        let result = set.execute(&call("beta", "hi")).await.unwrap();
        assert_eq!(result.output, "beta:hi");
        assert!(set.has_tool("alpha"));
        assert!(!set.has_tool("gamma"));
    }

    #[tokio::test]
    async fn composite_last_registered_wins_on_collision() {
        struct Tagged {
            tag: &'static str,
        }

        #[async_trait::async_trait]
        impl ToolSet for Tagged {
            fn definitions(&self) -> Vec<ToolDefinition> {
                vec![ToolDefinition::new("shared", self.tag, json!({}))]
            }

            async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
                Ok(ToolResult::ok(call, self.tag))
            }
        }

        let set = CompositeToolSet::new()
            .with(Box::new(Tagged { tag: "first" }))
            .with(Box::new(Tagged { tag: "second" }));

        // Single definition entry, taken from the later child.
        let defs = set.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].description, "second");

        let result = set.execute(&call("shared", "")).await.unwrap();
        assert_eq!(result.output, "second");
    }

    #[tokio::test]
    async fn composite_unknown_tool_is_an_error() {
        let set = CompositeToolSet::new().with(Box::new(BrokenTool));
        let err = set.execute(&call("missing", "")).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "missing"));
    }

    #[test]
    fn failed_result_carries_error_in_output() {
        let c = call("broken", "");
        let result = ToolResult::failed(&c, "boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.output.contains("boom"));
    }
}
