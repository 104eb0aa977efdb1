//! Task router: picks the sub-agent best suited to run a task.
//!
//! Resolution runs through five tiers, short-circuiting at the first that
//! produces an agent: explicit assignment, rule scoring, least-loaded
//! fallback, configured default, any available agent. A task no tier can
//! place fails with [`RoutingError::NoEligibleAgent`] -- fatal to that task's
//! execution attempt and never retried.
//!
//! Agents are kept in registration order so scoring ties and fallback scans
//! are deterministic: for a fixed rule set and load snapshot, `route` is a
//! pure function of the task.

use std::sync::{Arc, Mutex};

use regex::Regex;
use serde::Serialize;

use crate::agent::SubAgent;
use crate::error::RoutingError;
use crate::orchestration::Task;

/// Confidence reported per resolution tier.
const CONFIDENCE_EXPLICIT: f64 = 1.0;
const CONFIDENCE_LEAST_LOADED: f64 = 0.5;
const CONFIDENCE_DEFAULT_AGENT: f64 = 0.3;
const CONFIDENCE_ANY_AVAILABLE: f64 = 0.1;

/// Maps matching tasks to a preferred agent with a priority weight.
///
/// A rule matches when any of its predicates does: regex over the prompt,
/// case-insensitive keyword substring over the prompt, or equality against a
/// capability the task requires (the planner's role hint counts as one).
#[derive(Clone, Debug)]
pub struct RoutingRule {
    pub name: String,
    pub agent_id: String,
    pattern: Option<Regex>,
    keywords: Vec<String>,
    capability: Option<String>,
    pub priority: u8,
}

impl RoutingRule {
    pub fn new(name: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            pattern: None,
            keywords: Vec::new(),
            capability: None,
            priority: crate::agent::DEFAULT_PRIORITY,
        }
    }

    /// Compile and attach a regex predicate. Invalid patterns are rejected
    /// here, at configuration time, rather than silently never matching.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, RoutingError> {
        let compiled = Regex::new(pattern).map_err(|e| RoutingError::InvalidRulePattern {
            rule: self.name.clone(),
            message: e.to_string(),
        })?;
        self.pattern = Some(compiled);
        Ok(self)
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    /// Whether any predicate matches the task.
    fn matches(&self, task: &Task) -> bool {
        if let Some(pattern) = &self.pattern {
            if pattern.is_match(&task.prompt) {
                return true;
            }
        }
        if !self.keywords.is_empty() {
            let prompt = task.prompt.to_lowercase();
            if self
                .keywords
                .iter()
                .any(|kw| prompt.contains(&kw.to_lowercase()))
            {
                return true;
            }
        }
        if let Some(capability) = &self.capability {
            if task
                .required_capabilities()
                .iter()
                .any(|c| c == capability)
            {
                return true;
            }
            // The planner's role hint is advisory: it matches capability
            // rules but never hard-constrains routing.
            if task.agent_role() == Some(capability.as_str()) {
                return true;
            }
        }
        false
    }
}

/// Router behavior switches.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub default_agent_id: Option<String>,
    /// Attenuate rule scores by agent load (up to 50% at full utilization).
    pub load_balancing: bool,
    /// Enable the tier-3 least-loaded fallback.
    pub fallback_to_least_loaded: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_agent_id: None,
            load_balancing: true,
            fallback_to_least_loaded: true,
        }
    }
}

/// The outcome of routing one task. Immutable; appended to an ordered log
/// for audit.
#[derive(Clone, Debug, Serialize)]
pub struct RoutingDecision {
    pub agent_id: String,
    /// `[0, 1]`; higher tiers report higher confidence.
    pub confidence: f64,
    pub reason: String,
    pub matched_rules: Vec<String>,
}

/// Selects a [`SubAgent`] for each incoming task.
pub struct TaskRouter {
    agents: Vec<Arc<SubAgent>>,
    rules: Vec<RoutingRule>,
    config: RouterConfig,
    decisions: Mutex<Vec<RoutingDecision>>,
}

impl TaskRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            agents: Vec::new(),
            rules: Vec::new(),
            config,
            decisions: Mutex::new(Vec::new()),
        }
    }

    /// Register a sub-agent. Registration order breaks scoring ties and
    /// defines fallback scan order.
    pub fn register(&mut self, agent: Arc<SubAgent>) {
        tracing::debug!(agent_id = %agent.id(), role = %agent.role(), "agent registered");
        self.agents.push(agent);
    }

    pub fn add_rule(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<SubAgent>> {
        self.agents.iter().find(|a| a.id() == agent_id).cloned()
    }

    pub fn agents(&self) -> &[Arc<SubAgent>] {
        &self.agents
    }

    /// Ordered log of every decision made so far.
    pub fn decisions(&self) -> Vec<RoutingDecision> {
        self.decisions.lock().unwrap().clone()
    }

    /// Drop the decision log. Called between orchestrator executions.
    pub fn clear_decisions(&self) {
        self.decisions.lock().unwrap().clear();
    }

    /// Pick the sub-agent best suited to run the task.
    pub fn route(&self, task: &Task) -> Result<RoutingDecision, RoutingError> {
        let decision = self.resolve(task)?;
        tracing::info!(
            task_id = %task.id,
            agent_id = %decision.agent_id,
            confidence = decision.confidence,
            reason = %decision.reason,
            "task routed"
        );
        self.decisions.lock().unwrap().push(decision.clone());
        Ok(decision)
    }

    fn resolve(&self, task: &Task) -> Result<RoutingDecision, RoutingError> {
        // Tier 1: explicit assignment wins outright, rules notwithstanding.
        if let Some(agent_id) = task.assigned_agent_id() {
            if self.get(agent_id).is_some() {
                return Ok(RoutingDecision {
                    agent_id: agent_id.to_string(),
                    confidence: CONFIDENCE_EXPLICIT,
                    reason: "explicit assignment".to_string(),
                    matched_rules: Vec::new(),
                });
            }
        }

        // Tier 2: rule scoring. Each matching rule adds its priority to the
        // target agent's score; rules naming unregistered agents are inert.
        let mut scores: Vec<(usize, f64, Vec<String>)> = Vec::new();
        for rule in &self.rules {
            if !rule.matches(task) {
                continue;
            }
            let Some(index) = self.agents.iter().position(|a| a.id() == rule.agent_id) else {
                continue;
            };
            match scores.iter_mut().find(|(i, _, _)| *i == index) {
                Some((_, score, matched)) => {
                    *score += rule.priority as f64;
                    matched.push(rule.name.clone());
                }
                None => scores.push((index, rule.priority as f64, vec![rule.name.clone()])),
            }
        }

        let mut best: Option<(usize, f64, f64, Vec<String>)> = None;
        for (index, score, matched) in scores {
            if score <= 0.0 || !self.agents[index].can_handle(task) {
                continue;
            }
            let effective = if self.config.load_balancing {
                score * (1.0 - self.agents[index].load().utilization * 0.5)
            } else {
                score
            };
            let better = match &best {
                Some((_, _, best_effective, _)) => effective > *best_effective,
                None => true,
            };
            if better {
                best = Some((index, score, effective, matched));
            }
        }
        if let Some((index, score, _, matched)) = best {
            return Ok(RoutingDecision {
                agent_id: self.agents[index].id().to_string(),
                confidence: (score / 10.0).min(1.0),
                reason: format!("matched {} rule(s)", matched.len()),
                matched_rules: matched,
            });
        }

        // Tier 3: least-loaded eligible agent.
        if self.config.fallback_to_least_loaded {
            let mut least: Option<(usize, f64)> = None;
            for (index, agent) in self.agents.iter().enumerate() {
                if !agent.can_handle(task) {
                    continue;
                }
                let utilization = agent.load().utilization;
                let lower = match least {
                    Some((_, best_util)) => utilization < best_util,
                    None => true,
                };
                if lower {
                    least = Some((index, utilization));
                }
            }
            if let Some((index, _)) = least {
                return Ok(RoutingDecision {
                    agent_id: self.agents[index].id().to_string(),
                    confidence: CONFIDENCE_LEAST_LOADED,
                    reason: "least-loaded fallback".to_string(),
                    matched_rules: Vec::new(),
                });
            }
        }

        // Tier 4: configured default agent.
        if let Some(default_id) = &self.config.default_agent_id {
            if let Some(agent) = self.get(default_id) {
                if agent.can_handle(task) {
                    return Ok(RoutingDecision {
                        agent_id: default_id.clone(),
                        confidence: CONFIDENCE_DEFAULT_AGENT,
                        reason: "default agent".to_string(),
                        matched_rules: Vec::new(),
                    });
                }
            }
        }

        // Tier 5: first agent that can take the task at all.
        for agent in &self.agents {
            if agent.can_handle(task) {
                return Ok(RoutingDecision {
                    agent_id: agent.id().to_string(),
                    confidence: CONFIDENCE_ANY_AVAILABLE,
                    reason: "first available agent".to_string(),
                    matched_rules: Vec::new(),
                });
            }
        }

        Err(RoutingError::NoEligibleAgent {
            task_id: task.id.clone(),
        })
    }
}
