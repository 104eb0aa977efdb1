//! Versioned, path-addressed store for generated outputs.
//!
//! [`ArtifactRegistry`] is the single source of truth for files and documents
//! produced during one orchestration. It wraps a `HashMap` keyed by logical
//! path behind a `Mutex` for access from concurrently-running batch tasks.
//!
//! Identity is the `path`: two artifacts with the same path are the same
//! logical entity at different versions. The first write creates version 1;
//! every later write to the same path bumps the version and refreshes
//! `updated_at` while preserving `created_at` and the generated id.
//!
//! Durable persistence is delegated to an optional sink callback invoked on
//! every upsert. Sink failures are logged and swallowed -- they never fail
//! the orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad classification of an artifact's content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Plan,
    Code,
    Markdown,
    Json,
    Image,
    Text,
    Other,
}

/// Provenance and bookkeeping attached to an artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    /// ISO 8601 timestamp of the first write to this path.
    pub created_at: String,
    /// ISO 8601 timestamp of the most recent write.
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A versioned generated output (file, document, plan).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub filename: String,
    /// Logical path; the registry's identity key.
    pub path: String,
    pub content: String,
    pub mime_type: String,
    pub kind: ArtifactKind,
    pub metadata: ArtifactMetadata,
    /// Strictly increasing per path, starting at 1.
    pub version: u32,
}

/// Upsert input: at minimum a filename and content. Everything else is
/// inferred or defaulted by the registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub filename: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ArtifactDraft {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Callback invoked on every registry upsert, for external persistence.
pub type ArtifactSink = Arc<dyn Fn(&Artifact) -> anyhow::Result<()> + Send + Sync>;

/// Infer mime type and kind from a logical path.
///
/// The `plans/` prefix wins over the extension; unknown extensions fall back
/// to plain text / [`ArtifactKind::Other`].
fn infer_mime_and_kind(path: &str) -> (String, ArtifactKind) {
    if path.starts_with("plans/") {
        return ("text/markdown".to_string(), ArtifactKind::Plan);
    }

    let ext = path.rsplit('.').next().unwrap_or_default().to_lowercase();
    let (mime, kind) = match ext.as_str() {
        "md" | "markdown" => ("text/markdown", ArtifactKind::Markdown),
        "json" => ("application/json", ArtifactKind::Json),
        "png" => ("image/png", ArtifactKind::Image),
        "jpg" | "jpeg" => ("image/jpeg", ArtifactKind::Image),
        "gif" => ("image/gif", ArtifactKind::Image),
        "svg" => ("image/svg+xml", ArtifactKind::Image),
        "txt" => ("text/plain", ArtifactKind::Text),
        "rs" | "py" | "js" | "ts" | "tsx" | "jsx" | "go" | "java" | "c" | "cpp" | "h" | "sh" => {
            ("text/plain", ArtifactKind::Code)
        }
        "html" => ("text/html", ArtifactKind::Code),
        "css" => ("text/css", ArtifactKind::Code),
        "toml" | "yaml" | "yml" => ("text/plain", ArtifactKind::Code),
        _ => ("text/plain", ArtifactKind::Other),
    };
    (mime.to_string(), kind)
}

/// Keyed store of generated artifacts with path-based versioning.
///
/// Scoped to one orchestration: the owning [`crate::orchestration::Orchestrator`]
/// clears it between `execute` calls. Not a process-wide singleton.
pub struct ArtifactRegistry {
    by_path: Mutex<HashMap<String, Artifact>>,
    sink: Option<ArtifactSink>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self {
            by_path: Mutex::new(HashMap::new()),
            sink: None,
        }
    }

    /// Attach a persistence sink, invoked on every upsert.
    pub fn with_sink(mut self, sink: ArtifactSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Insert or update an artifact by logical path.
    ///
    /// An existing artifact at the draft's path keeps its `id` and
    /// `created_at`; its version is bumped and `updated_at` refreshed. A new
    /// path gets a fresh id at version 1.
    pub fn upsert(&self, draft: ArtifactDraft) -> Artifact {
        let path = draft.path.clone().unwrap_or_else(|| draft.filename.clone());
        let now = Utc::now().to_rfc3339();
        let (inferred_mime, inferred_kind) = infer_mime_and_kind(&path);

        let artifact = {
            let mut by_path = self.by_path.lock().unwrap();
            let artifact = match by_path.get(&path) {
                Some(existing) => Artifact {
                    id: existing.id.clone(),
                    filename: draft.filename,
                    path: path.clone(),
                    content: draft.content,
                    mime_type: draft.mime_type.unwrap_or(inferred_mime),
                    kind: draft.kind.unwrap_or(inferred_kind),
                    metadata: ArtifactMetadata {
                        agent_id: draft.agent_id.or_else(|| existing.metadata.agent_id.clone()),
                        agent_role: draft
                            .agent_role
                            .or_else(|| existing.metadata.agent_role.clone()),
                        created_at: existing.metadata.created_at.clone(),
                        updated_at: now,
                        task_id: draft.task_id.or_else(|| existing.metadata.task_id.clone()),
                        description: draft
                            .description
                            .or_else(|| existing.metadata.description.clone()),
                        tags: if draft.tags.is_empty() {
                            existing.metadata.tags.clone()
                        } else {
                            draft.tags
                        },
                    },
                    version: existing.version + 1,
                },
                None => Artifact {
                    id: Uuid::new_v4().to_string(),
                    filename: draft.filename,
                    path: path.clone(),
                    content: draft.content,
                    mime_type: draft.mime_type.unwrap_or(inferred_mime),
                    kind: draft.kind.unwrap_or(inferred_kind),
                    metadata: ArtifactMetadata {
                        agent_id: draft.agent_id,
                        agent_role: draft.agent_role,
                        created_at: now.clone(),
                        updated_at: now,
                        task_id: draft.task_id,
                        description: draft.description,
                        tags: draft.tags,
                    },
                    version: 1,
                },
            };
            by_path.insert(path, artifact.clone());
            artifact
        };

        tracing::debug!(
            path = %artifact.path,
            version = artifact.version,
            "artifact upserted"
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink(&artifact) {
                tracing::warn!(path = %artifact.path, "artifact sink failed: {e:#}");
            }
        }

        artifact
    }

    pub fn get_by_path(&self, path: &str) -> Option<Artifact> {
        self.by_path.lock().unwrap().get(path).cloned()
    }

    pub fn get_by_kind(&self, kind: ArtifactKind) -> Vec<Artifact> {
        let mut found: Vec<Artifact> = self
            .by_path
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    pub fn get_by_agent(&self, agent_id: &str) -> Vec<Artifact> {
        let mut found: Vec<Artifact> = self
            .by_path
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.metadata.agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    pub fn plans(&self) -> Vec<Artifact> {
        self.get_by_kind(ArtifactKind::Plan)
    }

    /// All artifacts, ordered by path.
    pub fn all(&self) -> Vec<Artifact> {
        let mut found: Vec<Artifact> = self.by_path.lock().unwrap().values().cloned().collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    pub fn len(&self) -> usize {
        self.by_path.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.lock().unwrap().is_empty()
    }

    /// Remove every artifact. Called between orchestrator executions.
    pub fn clear(&self) {
        self.by_path.lock().unwrap().clear();
    }
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new()
    }
}
