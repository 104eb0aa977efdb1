//! Model backend capability interface and chat message vocabulary.
//!
//! The orchestration core never talks to a concrete model provider. Hosts
//! implement [`ModelBackend`] over whatever wire protocol they use; the agent
//! loop only sees [`ChatMessage`]s going in and a [`ModelResponse`] (or a
//! stream of [`StreamEvent`]s) coming out.
//!
//! Message shape follows the usual chat convention: a system turn, user
//! turns, assistant turns that may carry tool-call requests, and tool turns
//! that carry results keyed to prior calls.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::tool::ToolDefinition;

/// Who produced a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    /// Carries tool results keyed to a prior assistant turn's calls.
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id correlating this call with its response.
    pub call_id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The payload a tool turn carries back to the model for one call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResponse {
    pub call_id: String,
    pub content: String,
}

impl ToolResponse {
    pub fn new(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// One conversation turn.
///
/// `tool_calls` is only populated on assistant turns, `tool_responses` only
/// on tool turns. Plain text lives in `content` for every role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_responses: Vec<ToolResponse>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    /// An assistant turn requesting tool calls (optionally with lead-in text).
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_responses: Vec::new(),
        }
    }

    /// A tool turn carrying the results for one iteration's calls.
    pub fn tool_responses(responses: Vec<ToolResponse>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_responses: responses,
        }
    }

    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_responses: Vec::new(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of a text response.
    Stop,
    /// The model requested tool calls.
    ToolCalls,
    /// Output truncated by a length limit.
    Length,
    Other(String),
}

/// A complete (non-streamed) model response.
#[derive(Clone, Debug)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl ModelResponse {
    /// A plain text response with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
        }
    }

    /// A response requesting the given tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
        }
    }
}

/// One fragment of an incrementally-streamed model response.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A chunk of assistant text.
    Text(String),
    /// A fully-assembled tool-call request.
    ToolCall(ToolCall),
}

/// Boxed stream of model output fragments.
pub type ModelStream = BoxStream<'static, Result<StreamEvent, BackendError>>;

/// Capability interface over a language model provider.
///
/// Implementations must be `Send + Sync` since sub-agents share one backend
/// across concurrent task executions.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// One-shot generation: full message history in, one response out.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, BackendError>;

    /// Incremental generation.
    ///
    /// The default implementation adapts [`generate`](Self::generate) into a
    /// short stream (text fragment, then tool calls), so backends without
    /// native streaming only implement `generate`.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelStream, BackendError> {
        let response = self.generate(messages, tools).await?;
        let mut events = Vec::new();
        if let Some(text) = response.content {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Text(text)));
            }
        }
        for call in response.tool_calls {
            events.push(Ok(StreamEvent::ToolCall(call)));
        }
        Ok(Box::pin(futures::stream::iter(events)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn assistant_tool_calls_populates_calls_only() {
        let call = ToolCall::new("c1", "file_write", serde_json::json!({"path": "a.txt"}));
        let msg = ChatMessage::assistant_tool_calls("", vec![call]);
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert!(msg.tool_responses.is_empty());
    }

    #[tokio::test]
    async fn default_stream_adapter_yields_text_then_calls() {
        struct OneShot;

        #[async_trait::async_trait]
        impl ModelBackend for OneShot {
            async fn generate(
                &self,
                _messages: &[ChatMessage],
                _tools: &[ToolDefinition],
            ) -> Result<ModelResponse, BackendError> {
                Ok(ModelResponse {
                    content: Some("thinking".to_string()),
                    tool_calls: vec![ToolCall::new("c1", "lookup", serde_json::json!({}))],
                    finish_reason: FinishReason::ToolCalls,
                })
            }
        }

        let backend = OneShot;
        let mut stream = backend
            .generate_stream(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::Text(ref t) if t == "thinking"));
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, StreamEvent::ToolCall(ref c) if c.name == "lookup"));
        assert!(stream.next().await.is_none());
    }
}
