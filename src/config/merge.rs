use super::schema::{default_max_iterations, EnsembleConfig, OrchestratorConfig, PartialConfig};
use crate::routing::RouterConfig;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For rules: REPLACE semantics (if self has Some, use it entirely).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            max_parallel_tasks: self.max_parallel_tasks.or(fallback.max_parallel_tasks),
            task_timeout_ms: self.task_timeout_ms.or(fallback.task_timeout_ms),
            retry_failed_tasks: self.retry_failed_tasks.or(fallback.retry_failed_tasks),
            max_retries: self.max_retries.or(fallback.max_retries),
            generate_plan_artifact: self
                .generate_plan_artifact
                .or(fallback.generate_plan_artifact),
            max_fix_rounds: self.max_fix_rounds.or(fallback.max_fix_rounds),
            output_excerpt_chars: self.output_excerpt_chars.or(fallback.output_excerpt_chars),
            default_agent_id: self.default_agent_id.or(fallback.default_agent_id),
            load_balancing: self.load_balancing.or(fallback.load_balancing),
            fallback_to_least_loaded: self
                .fallback_to_least_loaded
                .or(fallback.fallback_to_least_loaded),
            rules: self.rules.or(fallback.rules),
            max_iterations: self.max_iterations.or(fallback.max_iterations),
        }
    }

    /// Convert to EnsembleConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> EnsembleConfig {
        let defaults = OrchestratorConfig::default();
        EnsembleConfig {
            orchestrator: OrchestratorConfig {
                max_parallel_tasks: self
                    .max_parallel_tasks
                    .unwrap_or(defaults.max_parallel_tasks)
                    .max(1),
                task_timeout_ms: self.task_timeout_ms.unwrap_or(defaults.task_timeout_ms),
                retry_failed_tasks: self
                    .retry_failed_tasks
                    .unwrap_or(defaults.retry_failed_tasks),
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                generate_plan_artifact: self
                    .generate_plan_artifact
                    .unwrap_or(defaults.generate_plan_artifact),
                max_fix_rounds: self.max_fix_rounds.unwrap_or(defaults.max_fix_rounds),
                output_excerpt_chars: self
                    .output_excerpt_chars
                    .unwrap_or(defaults.output_excerpt_chars),
            },
            router: RouterConfig {
                default_agent_id: self.default_agent_id,
                load_balancing: self.load_balancing.unwrap_or(true),
                fallback_to_least_loaded: self.fallback_to_least_loaded.unwrap_or(true),
            },
            rules: self.rules.unwrap_or_default(),
            max_iterations: self.max_iterations.unwrap_or_else(default_max_iterations),
        }
    }
}
