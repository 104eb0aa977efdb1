use serde::Deserialize;

use crate::agent::DEFAULT_MAX_ITERATIONS;

/// The TOML file structure for ensemble.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub orchestrator: Option<OrchestratorSection>,
    pub router: Option<RouterSection>,
    pub agent: Option<AgentSection>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestratorSection {
    pub max_parallel_tasks: Option<usize>,
    pub task_timeout_ms: Option<u64>,
    pub retry_failed_tasks: Option<bool>,
    pub max_retries: Option<u32>,
    pub generate_plan_artifact: Option<bool>,
    pub max_fix_rounds: Option<u32>,
    pub output_excerpt_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RouterSection {
    pub default_agent_id: Option<String>,
    pub load_balancing: Option<bool>,
    pub fallback_to_least_loaded: Option<bool>,
    /// If specified, fully replaces any rules supplied by lower layers.
    pub rules: Option<Vec<RuleEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct AgentSection {
    pub max_iterations: Option<usize>,
}

/// One `[[router.rules]]` entry, compiled into a
/// [`crate::routing::RoutingRule`] by [`super::compile_rules`].
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub name: String,
    pub agent_id: String,
    pub pattern: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub capability: Option<String>,
    pub priority: Option<u8>,
}

/// Fully-resolved orchestrator settings. All fields have values.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on the size of a parallel-workflow batch.
    pub max_parallel_tasks: usize,
    /// Deadline for one task execution attempt.
    pub task_timeout_ms: u64,
    pub retry_failed_tasks: bool,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub generate_plan_artifact: bool,
    /// Ceiling on post-execution error-fix rounds.
    pub max_fix_rounds: u32,
    /// Character budget for per-task output excerpts fed to later tasks.
    pub output_excerpt_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            task_timeout_ms: 300_000,
            retry_failed_tasks: true,
            max_retries: 2,
            generate_plan_artifact: true,
            max_fix_rounds: 5,
            output_excerpt_chars: 800,
        }
    }
}

/// Fully-resolved crate configuration.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub orchestrator: OrchestratorConfig,
    pub router: crate::routing::RouterConfig,
    /// Uncompiled rule entries; see [`super::compile_rules`].
    pub rules: Vec<RuleEntry>,
    pub max_iterations: usize,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub max_parallel_tasks: Option<usize>,
    pub task_timeout_ms: Option<u64>,
    pub retry_failed_tasks: Option<bool>,
    pub max_retries: Option<u32>,
    pub generate_plan_artifact: Option<bool>,
    pub max_fix_rounds: Option<u32>,
    pub output_excerpt_chars: Option<usize>,
    pub default_agent_id: Option<String>,
    pub load_balancing: Option<bool>,
    pub fallback_to_least_loaded: Option<bool>,
    pub rules: Option<Vec<RuleEntry>>,
    pub max_iterations: Option<usize>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let orchestrator = self.orchestrator;
        let router = self.router;
        let agent = self.agent;
        PartialConfig {
            max_parallel_tasks: orchestrator.as_ref().and_then(|o| o.max_parallel_tasks),
            task_timeout_ms: orchestrator.as_ref().and_then(|o| o.task_timeout_ms),
            retry_failed_tasks: orchestrator.as_ref().and_then(|o| o.retry_failed_tasks),
            max_retries: orchestrator.as_ref().and_then(|o| o.max_retries),
            generate_plan_artifact: orchestrator
                .as_ref()
                .and_then(|o| o.generate_plan_artifact),
            max_fix_rounds: orchestrator.as_ref().and_then(|o| o.max_fix_rounds),
            output_excerpt_chars: orchestrator.as_ref().and_then(|o| o.output_excerpt_chars),
            default_agent_id: router.as_ref().and_then(|r| r.default_agent_id.clone()),
            load_balancing: router.as_ref().and_then(|r| r.load_balancing),
            fallback_to_least_loaded: router.as_ref().and_then(|r| r.fallback_to_least_loaded),
            rules: router.and_then(|r| r.rules),
            max_iterations: agent.and_then(|a| a.max_iterations),
        }
    }
}

pub(super) fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
