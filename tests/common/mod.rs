//! Shared fixtures for integration tests: a scripted model backend and a
//! file-writing tool set that emits artifacts.

// Each test binary uses a different subset of these fixtures.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ensemble::agent::{Agent, SubAgent};
use ensemble::artifact::ArtifactDraft;
use ensemble::backend::{ChatMessage, ModelBackend, ModelResponse, ToolCall};
use ensemble::error::{BackendError, ToolError};
use ensemble::tool::{NoTools, ToolDefinition, ToolResult, ToolSet};

/// Route `RUST_LOG`-filtered traces to the test writer. Only the first call
/// installs the subscriber; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replays a fixed sequence of responses and records every request.
pub struct ReplayBackend {
    script: Mutex<VecDeque<ModelResponse>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ReplayBackend {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ModelBackend for ReplayBackend {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse, BackendError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ModelResponse::text("done")))
    }
}

/// A `write_file` tool whose results carry artifact drafts.
pub struct FileWriterTool;

#[async_trait::async_trait]
impl ToolSet for FileWriterTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "write_file",
            "Write content to a named file",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "filename": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["filename", "content"]
            }),
        )]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let filename = call
            .arguments
            .get("filename")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: call.name.clone(),
                message: "missing 'filename'".to_string(),
            })?;
        let content = call
            .arguments
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Ok(ToolResult::ok(call, format!("wrote {filename}"))
            .with_artifact(ArtifactDraft::new(filename, content)))
    }
}

/// A sub-agent with no tools over a replay script.
pub fn scripted_sub_agent(id: &str, role: &str, responses: Vec<ModelResponse>) -> Arc<SubAgent> {
    let backend = Arc::new(ReplayBackend::new(responses));
    Arc::new(SubAgent::new(
        Agent::new(id, id, backend, Arc::new(NoTools)),
        role,
    ))
}

/// A sub-agent whose tool calls can emit artifacts via [`FileWriterTool`].
pub fn writing_sub_agent(id: &str, role: &str, responses: Vec<ModelResponse>) -> Arc<SubAgent> {
    let backend = Arc::new(ReplayBackend::new(responses));
    Arc::new(SubAgent::new(
        Agent::new(id, id, backend, Arc::new(FileWriterTool)),
        role,
    ))
}

/// A tool-call response writing one file.
pub fn write_call(call_id: &str, filename: &str, content: &str) -> ModelResponse {
    ModelResponse::tool_calls(vec![ToolCall::new(
        call_id,
        "write_file",
        serde_json::json!({"filename": filename, "content": content}),
    )])
}
