//! Objective decomposition: planning prompt, plan parsing, and plan
//! materialization helpers.
//!
//! The planning agent is asked for a strict JSON plan. Parsing is two-stage:
//! a brace-matched JSON extraction plus serde decode first, then a heuristic
//! line-splitter fallback for models that answer in prose. Both stages
//! produce the same [`DecomposedPlan`] type, so plan parse failure is always
//! recovered locally and never fatal.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// One step of a decomposed plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannedTask {
    pub id: String,
    #[serde(alias = "agentRole", default = "default_role")]
    pub agent_role: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(
        alias = "estimatedTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_time: Option<String>,
}

fn default_role() -> String {
    "general".to_string()
}

/// Structured breakdown of one objective into ordered, role-tagged tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecomposedPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub objective: String,
    pub strategy: String,
    pub tasks: Vec<PlannedTask>,
}

/// Loose shape of the JSON a planning model actually returns; missing
/// fields are filled from the request before becoming a [`DecomposedPlan`].
#[derive(Debug, Deserialize)]
struct PlanJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    tasks: Vec<PlannedTask>,
}

/// Build the structured prompt sent to the planning agent.
pub fn build_planning_prompt(objective: &str, roles: &[String]) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(
        "Decompose the following objective into a task plan.\n\
         Respond with a single JSON object and nothing else, shaped as:\n\
         {\"name\": \"short plan name\", \"objective\": \"...\", \"strategy\": \"sequential\",\n \
          \"tasks\": [{\"id\": \"task-1\", \"agentRole\": \"...\", \"description\": \"...\",\n \
          \"complexity\": \"low|medium|high\", \"estimatedTime\": \"...\"}]}\n\n",
    );

    if !roles.is_empty() {
        prompt.push_str("Available agent roles: ");
        prompt.push_str(&roles.join(", "));
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Objective\n\n");
    prompt.push_str(objective);
    prompt
}

/// Parse the planner's output into a [`DecomposedPlan`].
///
/// Tries the strict path (first balanced JSON object, serde decode) and
/// falls back to treating each non-empty, non-heading line as one task.
pub fn parse_plan(output: &str, objective: &str, default_strategy: &str) -> DecomposedPlan {
    if let Some(json) = extract_first_json_object(output) {
        if let Ok(parsed) = serde_json::from_str::<PlanJson>(json) {
            if !parsed.tasks.is_empty() {
                return DecomposedPlan {
                    name: parsed.name,
                    objective: parsed.objective.unwrap_or_else(|| objective.to_string()),
                    strategy: parsed.strategy.unwrap_or_else(|| default_strategy.to_string()),
                    tasks: parsed.tasks,
                };
            }
        }
        tracing::debug!("plan JSON decode failed, falling back to line parsing");
    }
    heuristic_plan(output, objective, default_strategy)
}

/// Return the first balanced `{...}` object in the text, honoring string
/// literals and escapes so braces inside strings don't end the scan.
fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Line-based fallback: every non-empty, non-heading, non-fence line becomes
/// one task, with leading list markers (`1.`, `2)`, `-`, `*`) stripped.
fn heuristic_plan(output: &str, objective: &str, default_strategy: &str) -> DecomposedPlan {
    let mut tasks = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("```") {
            continue;
        }
        let description = strip_list_marker(trimmed);
        if description.is_empty() {
            continue;
        }
        tasks.push(PlannedTask {
            id: format!("task-{}", tasks.len() + 1),
            agent_role: default_role(),
            description: description.to_string(),
            complexity: None,
            estimated_time: None,
        });
    }

    // A planner that produced nothing usable still yields a one-task plan
    // so the workflow has something to execute.
    if tasks.is_empty() {
        tasks.push(PlannedTask {
            id: "task-1".to_string(),
            agent_role: default_role(),
            description: objective.to_string(),
            complexity: None,
            estimated_time: None,
        });
    }

    DecomposedPlan {
        name: None,
        objective: objective.to_string(),
        strategy: default_strategy.to_string(),
        tasks,
    }
}

/// Strip a leading `N.`, `N)`, `-`, or `*` list marker.
fn strip_list_marker(line: &str) -> &str {
    let rest = line.trim_start();
    if let Some(stripped) = rest.strip_prefix('-').or_else(|| rest.strip_prefix('*')) {
        return stripped.trim_start();
    }
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return stripped.trim_start();
        }
    }
    rest
}

/// Whether a plan warrants materialization as a plan artifact.
///
/// Complex means at least three tasks, or more than one distinct agent role
/// combined with at least one medium/high-complexity task.
pub fn is_complex(plan: &DecomposedPlan) -> bool {
    if plan.tasks.len() >= 3 {
        return true;
    }

    let mut roles: Vec<&str> = plan.tasks.iter().map(|t| t.agent_role.as_str()).collect();
    roles.sort_unstable();
    roles.dedup();

    let has_weighty_task = plan.tasks.iter().any(|t| {
        t.complexity
            .as_deref()
            .map(|c| {
                let c = c.to_lowercase();
                c == "medium" || c == "high"
            })
            .unwrap_or(false)
    });

    roles.len() > 1 && has_weighty_task
}

/// Render a plan as the Markdown document stored in the artifact registry.
pub fn render_plan_markdown(plan: &DecomposedPlan) -> String {
    let title = plan.name.as_deref().unwrap_or(&plan.objective);
    let mut doc = format!(
        "# {title}\n\n**Objective:** {}\n\n**Strategy:** {}\n\n## Tasks\n\n",
        plan.objective, plan.strategy
    );
    for (i, task) in plan.tasks.iter().enumerate() {
        doc.push_str(&format!(
            "{}. **[{}]** {}",
            i + 1,
            task.agent_role,
            task.description
        ));
        if let Some(complexity) = &task.complexity {
            doc.push_str(&format!(" _(complexity: {complexity})_"));
        }
        if let Some(estimate) = &task.estimated_time {
            doc.push_str(&format!(" _(est: {estimate})_"));
        }
        doc.push('\n');
    }
    doc
}

/// Derive the plan artifact's filename from its name or objective.
pub fn plan_filename(plan: &DecomposedPlan) -> String {
    let source = plan.name.as_deref().unwrap_or(&plan.objective);
    let mut slug = String::new();
    for c in source.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "plan.md".to_string()
    } else {
        format!("{slug}.md")
    }
}

/// Find an existing plan artifact the objective refers to by name.
///
/// Matching is fuzzy: both sides are lowercased and stripped to
/// alphanumerics-and-spaces, then the objective must contain the filename
/// stem. Returns the artifact's path so the caller can update it in place.
pub fn find_referenced_plan(objective: &str, plans: &[Artifact]) -> Option<String> {
    let normalized_objective = normalize_for_match(objective);
    for artifact in plans {
        let stem = artifact
            .filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&artifact.filename);
        let normalized_stem = normalize_for_match(stem);
        if normalized_stem.len() >= 3 && normalized_objective.contains(&normalized_stem) {
            return Some(artifact.path.clone());
        }
    }
    None
}

/// Lowercase and collapse everything that is not alphanumeric into single
/// spaces, so "Auth-Feature Plan!" and "auth feature plan" compare equal.
fn normalize_for_match(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}
