pub mod merge;
pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::Context;

use crate::error::RoutingError;
use crate::routing::RoutingRule;

/// Load configuration by merging host overrides, a config file, and
/// defaults. Precedence: overrides > file > defaults.
///
/// A missing config file is handled gracefully (defaults apply).
pub fn load_config(path: Option<&Path>, overrides: PartialConfig) -> EnsembleConfig {
    let file_partial = match path {
        Some(p) => load_toml_file(p).unwrap_or_default(),
        None => PartialConfig::default(),
    };
    overrides.with_fallback(file_partial).finalize()
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and ignored.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Compile `[[router.rules]]` entries into routing rules.
///
/// Fails fast on an invalid regex rather than installing a rule that can
/// never match.
pub fn compile_rules(entries: &[RuleEntry]) -> Result<Vec<RoutingRule>, RoutingError> {
    let mut rules = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut rule = RoutingRule::new(&entry.name, &entry.agent_id);
        if let Some(pattern) = &entry.pattern {
            rule = rule.with_pattern(pattern)?;
        }
        if let Some(keywords) = &entry.keywords {
            rule = rule.with_keywords(keywords.clone());
        }
        if let Some(capability) = &entry.capability {
            rule = rule.with_capability(capability);
        }
        if let Some(priority) = entry.priority {
            rule = rule.with_priority(priority);
        }
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(
            Some(Path::new("/nonexistent/ensemble.toml")),
            PartialConfig::default(),
        );
        assert_eq!(config.orchestrator.max_parallel_tasks, 5);
        assert_eq!(config.orchestrator.task_timeout_ms, 300_000);
        assert!(config.orchestrator.retry_failed_tasks);
        assert_eq!(config.orchestrator.max_retries, 2);
        assert!(config.orchestrator.generate_plan_artifact);
        assert!(config.router.load_balancing);
        assert!(config.router.fallback_to_least_loaded);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn file_values_override_defaults_and_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[orchestrator]
max_parallel_tasks = 3
max_retries = 7

[router]
default_agent_id = "generalist"
load_balancing = false

[[router.rules]]
name = "code"
agent_id = "coder"
keywords = ["implement"]
priority = 8

[agent]
max_iterations = 4
"#
        )
        .unwrap();

        let overrides = PartialConfig {
            max_retries: Some(1),
            ..Default::default()
        };
        let config = load_config(Some(&path), overrides);

        assert_eq!(config.orchestrator.max_parallel_tasks, 3);
        // Override beats the file.
        assert_eq!(config.orchestrator.max_retries, 1);
        assert_eq!(config.router.default_agent_id.as_deref(), Some("generalist"));
        assert!(!config.router.load_balancing);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].agent_id, "coder");
        assert_eq!(config.max_iterations, 4);
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();

        let config = load_config(Some(&path), PartialConfig::default());
        assert_eq!(config.orchestrator.max_parallel_tasks, 5);
    }

    #[test]
    fn compile_rules_rejects_bad_patterns() {
        let entries = vec![RuleEntry {
            name: "bad".to_string(),
            agent_id: "a".to_string(),
            pattern: Some("(unclosed".to_string()),
            keywords: None,
            capability: None,
            priority: None,
        }];
        assert!(compile_rules(&entries).is_err());
    }

    #[test]
    fn compile_rules_builds_full_rules() {
        let entries = vec![RuleEntry {
            name: "code".to_string(),
            agent_id: "coder".to_string(),
            pattern: Some(r"(?i)\bimplement\b".to_string()),
            keywords: Some(vec!["build".to_string()]),
            capability: Some("rust".to_string()),
            priority: Some(9),
        }];
        let rules = compile_rules(&entries).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].agent_id, "coder");
        assert_eq!(rules[0].priority, 9);
    }
}
