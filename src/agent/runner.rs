//! Core think -> act -> observe loop.
//!
//! [`Agent`] drives one task to completion against a model backend and a
//! tool set:
//!
//! 1. Renders the task into a user turn and appends it to memory
//! 2. Sends the system prompt plus the full context window to the backend
//! 3. Executes every tool call the model requests, feeding results back
//! 4. Terminates when the model answers with no tool calls, or when the
//!    iteration ceiling is hit (exhaustion is reported, not an error)
//!
//! Tool failures are caught per call and surfaced to the model as failed
//! results; a single failing tool never aborts an iteration. Backend errors
//! propagate out and surface as a failed task execution.
//!
//! [`Agent::execute_stream`] is the incremental variant: a pull-based event
//! stream over the same loop. Dropping the stream stops the loop at the next
//! suspension point; cancellation is cooperative, never preemptive mid-call.

use std::sync::{Arc, Mutex};

use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;

use crate::agent::events::{AgentEvent, AgentProgress, ProgressFn};
use crate::agent::memory::ConversationMemory;
use crate::artifact::ArtifactDraft;
use crate::backend::{ChatMessage, ModelBackend, StreamEvent, ToolCall, ToolResponse};
use crate::error::AgentError;
use crate::orchestration::Task;
use crate::tool::{ToolResult, ToolSet};

/// Default iteration ceiling for the conversation loop.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Execution summary attached to every [`AgentResult`].
#[derive(Clone, Debug, Serialize)]
pub struct ResultMetadata {
    pub agent_id: String,
    /// Iterations consumed by the loop.
    pub iterations: usize,
    /// True when the loop hit the iteration ceiling without a terminal
    /// text-only response.
    pub iterations_exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Outcome of one [`Agent::execute`] call.
#[derive(Clone, Debug, Serialize)]
pub struct AgentResult {
    /// Final model text (or the last text seen, on iteration exhaustion).
    pub output: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    /// Artifacts collected from tool results during the run.
    pub artifacts: Vec<ArtifactDraft>,
    pub metadata: ResultMetadata,
}

/// One execution unit running the think -> act -> observe loop.
///
/// The backend and tool set are shared (`Arc`) since several agents commonly
/// sit on the same provider. Memory is per-agent, behind a `Mutex` so a
/// [`crate::agent::SubAgent`] can run executions through a shared reference;
/// critical sections never span an await.
pub struct Agent {
    id: String,
    name: String,
    system_prompt: Option<String>,
    backend: Arc<dyn ModelBackend>,
    tools: Arc<dyn ToolSet>,
    memory: Mutex<ConversationMemory>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        backend: Arc<dyn ModelBackend>,
        tools: Arc<dyn ToolSet>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
            backend,
            tools,
            memory: Mutex::new(ConversationMemory::new()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Clear conversation memory. Used between independent user turns in the
    /// surrounding host, never inside a single `execute` call.
    pub fn reset(&self) {
        self.memory.lock().unwrap().clear();
    }

    /// Run the loop to completion for one task.
    pub async fn execute(
        &self,
        task: &Task,
        progress: Option<ProgressFn>,
    ) -> Result<AgentResult, AgentError> {
        if task.prompt.trim().is_empty() {
            return Err(AgentError::EmptyPrompt {
                agent_id: self.id.clone(),
            });
        }

        let notify = |event: AgentProgress| {
            if let Some(ref f) = progress {
                f(event);
            }
        };

        self.memory
            .lock()
            .unwrap()
            .push(ChatMessage::user(render_task_message(task)));

        let definitions = self.tools.definitions();
        let mut all_calls: Vec<ToolCall> = Vec::new();
        let mut all_results: Vec<ToolResult> = Vec::new();
        let mut artifacts: Vec<ArtifactDraft> = Vec::new();
        let mut last_text = String::new();

        for iteration in 1..=self.max_iterations {
            notify(AgentProgress::IterationStarted {
                iteration,
                max_iterations: self.max_iterations,
            });
            tracing::debug!(agent_id = %self.id, iteration, "agent iteration");

            let messages = self.outgoing_messages();
            let response = self.backend.generate(&messages, &definitions).await?;

            if let Some(text) = &response.content {
                if !text.is_empty() {
                    last_text = text.clone();
                }
            }

            if response.tool_calls.is_empty() {
                // Terminal text-only response.
                let output = response.content.unwrap_or_default();
                self.memory
                    .lock()
                    .unwrap()
                    .push(ChatMessage::assistant(output.clone()));
                return Ok(AgentResult {
                    output,
                    tool_calls: all_calls,
                    tool_results: all_results,
                    artifacts,
                    metadata: ResultMetadata {
                        agent_id: self.id.clone(),
                        iterations: iteration,
                        iterations_exhausted: false,
                        task_id: Some(task.id.clone()),
                    },
                });
            }

            self.memory
                .lock()
                .unwrap()
                .push(ChatMessage::assistant_tool_calls(
                    response.content.clone().unwrap_or_default(),
                    response.tool_calls.clone(),
                ));

            let mut responses: Vec<ToolResponse> = Vec::new();
            for call in &response.tool_calls {
                notify(AgentProgress::ToolStarted {
                    name: call.name.clone(),
                });

                let result = self.run_tool(call).await;

                notify(AgentProgress::ToolCompleted {
                    name: call.name.clone(),
                });

                if let Some(draft) = &result.artifact {
                    artifacts.push(draft.clone());
                }
                responses.push(ToolResponse::new(call.call_id.clone(), result.output.clone()));
                all_calls.push(call.clone());
                all_results.push(result);
            }

            self.memory
                .lock()
                .unwrap()
                .push(ChatMessage::tool_responses(responses));
        }

        // Iteration ceiling reached without a terminal response. Not an
        // error: report the last seen text and flag the exhaustion.
        tracing::debug!(agent_id = %self.id, max = self.max_iterations, "iteration ceiling reached");
        Ok(AgentResult {
            output: last_text,
            tool_calls: all_calls,
            tool_results: all_results,
            artifacts,
            metadata: ResultMetadata {
                agent_id: self.id.clone(),
                iterations: self.max_iterations,
                iterations_exhausted: true,
                task_id: Some(task.id.clone()),
            },
        })
    }

    /// Run the loop as a lazy event stream.
    ///
    /// Each call produces a fresh stream; streams are not shared across
    /// calls. The consumer drives iteration -- dropping the stream before
    /// `Done` leaves the iteration's remaining tool calls unexecuted.
    pub fn execute_stream(
        &self,
        task: Task,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + Send + '_ {
        async_stream::try_stream! {
            if task.prompt.trim().is_empty() {
                Err(AgentError::EmptyPrompt { agent_id: self.id.clone() })?;
            }

            self.memory
                .lock()
                .unwrap()
                .push(ChatMessage::user(render_task_message(&task)));

            let definitions = self.tools.definitions();
            let mut last_text = String::new();
            let mut finished = false;

            for iteration in 1..=self.max_iterations {
                yield AgentEvent::Iteration {
                    iteration,
                    max_iterations: self.max_iterations,
                };

                let messages = self.outgoing_messages();
                let mut model_stream = self
                    .backend
                    .generate_stream(&messages, &definitions)
                    .await
                    .map_err(AgentError::Backend)?;

                let mut text_parts: Vec<String> = Vec::new();
                let mut calls: Vec<ToolCall> = Vec::new();
                while let Some(event) = model_stream.next().await {
                    match event.map_err(AgentError::Backend)? {
                        StreamEvent::Text(fragment) => {
                            yield AgentEvent::Thought { text: fragment.clone() };
                            text_parts.push(fragment);
                        }
                        StreamEvent::ToolCall(call) => calls.push(call),
                    }
                }
                drop(model_stream);

                let text = text_parts.concat();
                if !text.is_empty() {
                    last_text = text.clone();
                }

                if calls.is_empty() {
                    self.memory
                        .lock()
                        .unwrap()
                        .push(ChatMessage::assistant(text.clone()));
                    yield AgentEvent::Response { text };
                    yield AgentEvent::Done { iterations: iteration };
                    finished = true;
                    break;
                }

                self.memory
                    .lock()
                    .unwrap()
                    .push(ChatMessage::assistant_tool_calls(text, calls.clone()));

                let mut responses: Vec<ToolResponse> = Vec::new();
                for call in calls {
                    yield AgentEvent::ToolCall { call: call.clone() };
                    let result = self.run_tool(&call).await;
                    responses.push(ToolResponse::new(
                        call.call_id.clone(),
                        result.output.clone(),
                    ));
                    yield AgentEvent::ToolResult { result };
                }

                self.memory
                    .lock()
                    .unwrap()
                    .push(ChatMessage::tool_responses(responses));
            }

            // Exhausted: surface the last text so consumers see parity with
            // the non-streaming variant.
            if !finished {
                yield AgentEvent::Response { text: last_text };
                yield AgentEvent::Done { iterations: self.max_iterations };
            }
        }
    }

    /// Execute one tool call, converting any error into a failed result the
    /// model can observe.
    async fn run_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(agent_id = %self.id, tool = %call.name, "tool failed: {e}");
                ToolResult::failed(call, e.to_string())
            }
        }
    }

    /// System prompt (if set) followed by the full memory window.
    fn outgoing_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(self.memory.lock().unwrap().snapshot());
        messages
    }
}

/// Render a task into the user turn handed to the model.
///
/// The prompt comes first, followed by excerpts of earlier task outputs (in
/// order), merged context entries, and a listing of artifacts already
/// produced during this orchestration.
fn render_task_message(task: &Task) -> String {
    let mut message = String::with_capacity(task.prompt.len() + 256);
    message.push_str(&task.prompt);

    if !task.previous_outputs.is_empty() {
        message.push_str("\n\n## Previous task outputs\n\n");
        for (i, output) in task.previous_outputs.iter().enumerate() {
            message.push_str(&format!("{}. {}\n", i + 1, output));
        }
    }

    if !task.context.is_empty() {
        message.push_str("\n## Context\n\n");
        let mut keys: Vec<&String> = task.context.keys().collect();
        keys.sort();
        for key in keys {
            let value = &task.context[key];
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message.push_str(&format!("- {key}: {rendered}\n"));
        }
    }

    if !task.existing_artifacts.is_empty() {
        message.push_str("\n## Existing artifacts\n\n");
        for artifact in &task.existing_artifacts {
            message.push_str(&format!("- {} (v{})\n", artifact.path, artifact.version));
        }
    }

    message
}
