//! Top-level coordinator: planning, workflow execution, retries, deadlines,
//! and artifact reconciliation.
//!
//! [`Orchestrator::execute`] decomposes an objective into a plan via a
//! dedicated planning agent, converts plan steps into tasks, executes them
//! under one of three workflow modes, and folds every emitted artifact into
//! the shared registry. Afterward a bounded error-detection-and-fix loop
//! runs against a dedicated debugging agent.
//!
//! The registry, execution map, and routing log are owned by this instance;
//! `execute` takes `&mut self`, so concurrent orchestrations require
//! separate instances. Parallel batches share the instance internally
//! through `&self` and interior mutability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentProgress, AgentResult, ProgressFn};
use crate::artifact::{Artifact, ArtifactDraft, ArtifactKind, ArtifactRegistry, ArtifactSink};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::orchestration::planner::{
    build_planning_prompt, find_referenced_plan, is_complex, parse_plan, plan_filename,
    render_plan_markdown, DecomposedPlan,
};
use crate::orchestration::types::{Task, TaskExecution, TaskStatus, WorkflowMode, META_AGENT_ROLE};
use crate::routing::{RoutingDecision, TaskRouter};

/// Aggregate outcome of one [`Orchestrator::execute`] call.
#[derive(Debug)]
pub struct OrchestratorResult {
    /// Every agent result, in completion order (error-fix rounds included).
    pub results: Vec<AgentResult>,
    /// Concatenation of all non-empty task outputs.
    pub final_output: String,
    /// Ordered routing log for this execution.
    pub routing_decisions: Vec<RoutingDecision>,
    pub elapsed_ms: u64,
    /// Full artifact set at the end of the execution.
    pub artifacts: Vec<Artifact>,
    pub plan_artifact: Option<Artifact>,
    pub plan: Option<DecomposedPlan>,
}

/// Coordinates specialized agents against one high-level objective.
pub struct Orchestrator {
    router: TaskRouter,
    registry: ArtifactRegistry,
    config: OrchestratorConfig,
    planning_agent: Option<Arc<Agent>>,
    debug_agent: Option<Arc<Agent>>,
    executions: Arc<Mutex<HashMap<String, TaskExecution>>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(router: TaskRouter, config: OrchestratorConfig) -> Self {
        Self {
            router,
            registry: ArtifactRegistry::new(),
            config,
            planning_agent: None,
            debug_agent: None,
            executions: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the agent that decomposes objectives into plans.
    pub fn with_planning_agent(mut self, agent: Arc<Agent>) -> Self {
        self.planning_agent = Some(agent);
        self
    }

    /// Attach the agent driving the post-execution error-fix loop.
    pub fn with_debug_agent(mut self, agent: Arc<Agent>) -> Self {
        self.debug_agent = Some(agent);
        self
    }

    /// Attach a persistence sink, invoked on every artifact upsert.
    pub fn with_artifact_sink(mut self, sink: ArtifactSink) -> Self {
        self.registry = ArtifactRegistry::new().with_sink(sink);
        self
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    /// Token that cancels the in-flight execution when triggered.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the per-task execution records.
    pub fn executions(&self) -> Vec<TaskExecution> {
        let mut all: Vec<TaskExecution> =
            self.executions.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.task_id.cmp(&b.task_id)));
        all
    }

    /// Reset the artifact registry. Call between independent executions when
    /// earlier artifacts should not remain visible (plan updates rely on
    /// them remaining otherwise).
    pub fn clear_artifacts(&self) {
        self.registry.clear();
    }

    /// Run one objective under the given workflow mode.
    ///
    /// On fatal failure (routing, exhausted retries, cancellation) the error
    /// is returned with context rather than a partial result; routing
    /// decisions and execution records remain inspectable on the instance.
    pub async fn execute(
        &mut self,
        objective: &str,
        workflow: WorkflowMode,
    ) -> anyhow::Result<OrchestratorResult> {
        use anyhow::Context;

        let started = Instant::now();
        self.router.clear_decisions();
        self.executions.lock().unwrap().clear();
        tracing::info!(workflow = ?workflow, "orchestration started");

        // 1. Planning. Parallel workflows skip the planner and split the
        // objective directly; so does any workflow without a planning agent.
        let plan = match self.planning_agent.clone() {
            Some(agent) if workflow != WorkflowMode::Parallel => Some(
                self.plan_objective(&agent, objective, workflow)
                    .await
                    .context("Orchestrator execution failed")?,
            ),
            _ => None,
        };

        // 2. Plan materialization.
        let plan_path = plan
            .as_ref()
            .and_then(|p| self.materialize_plan(objective, p))
            .map(|artifact| artifact.path);

        // 3. Task conversion.
        let tasks = match &plan {
            Some(plan) => plan_to_tasks(plan),
            None => objective_to_tasks(objective, workflow),
        };

        // 4. Workflow execution.
        let results = match workflow {
            WorkflowMode::Sequential => self.run_sequential(&tasks, false).await,
            WorkflowMode::Conditional => self.run_sequential(&tasks, true).await,
            WorkflowMode::Parallel => self.run_parallel(&tasks).await,
        }
        .context("Orchestrator execution failed")?;

        // 5. Post-execution error-fix loop. Never fails the orchestration.
        let mut results = results;
        self.run_error_fix_loop(&mut results).await;

        let final_output = results
            .iter()
            .map(|r| r.output.as_str())
            .filter(|o| !o.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let plan_artifact = plan_path.and_then(|path| self.registry.get_by_path(&path));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(elapsed_ms, tasks = results.len(), "orchestration finished");

        Ok(OrchestratorResult {
            results,
            final_output,
            routing_decisions: self.router.decisions(),
            elapsed_ms,
            artifacts: self.registry.all(),
            plan_artifact,
            plan,
        })
    }

    /// Ask the planning agent for a structured plan.
    async fn plan_objective(
        &self,
        agent: &Agent,
        objective: &str,
        workflow: WorkflowMode,
    ) -> Result<DecomposedPlan, OrchestratorError> {
        let mut roles: Vec<String> = self
            .router
            .agents()
            .iter()
            .map(|a| a.role().to_string())
            .collect();
        roles.sort();
        roles.dedup();

        let prompt = build_planning_prompt(objective, &roles);
        let task = Task::new(format!("plan-{}", uuid::Uuid::new_v4()), prompt);
        let result =
            agent
                .execute(&task, None)
                .await
                .map_err(|e| OrchestratorError::TaskFailed {
                    task_id: task.id.clone(),
                    attempts: 1,
                    message: format!("planning failed: {e}"),
                })?;

        let plan = parse_plan(&result.output, objective, workflow_strategy(workflow));
        tracing::debug!(tasks = plan.tasks.len(), "objective decomposed");
        Ok(plan)
    }

    /// Register the plan as a `plans/` artifact when it is complex enough,
    /// updating an existing plan in place when the objective names one.
    fn materialize_plan(&self, objective: &str, plan: &DecomposedPlan) -> Option<Artifact> {
        if !self.config.generate_plan_artifact || !is_complex(plan) {
            return None;
        }

        let markdown = render_plan_markdown(plan);
        let existing = self.registry.plans();

        let draft = match find_referenced_plan(objective, &existing) {
            Some(path) => {
                let current = self.registry.get_by_path(&path)?;
                tracing::debug!(path = %path, "updating referenced plan artifact");
                let mut draft = ArtifactDraft::new(current.filename, markdown).with_path(path);
                draft.kind = Some(ArtifactKind::Plan);
                draft
            }
            None => {
                let filename = plan_filename(plan);
                let mut draft = ArtifactDraft::new(filename.clone(), markdown)
                    .with_path(format!("plans/{filename}"));
                draft.kind = Some(ArtifactKind::Plan);
                draft
            }
        };

        Some(self.registry.upsert(draft))
    }

    /// Sequential (and conditional) execution: one task at a time, each
    /// seeing the truncated outputs of everything before it. Conditional
    /// additionally merges a `result_<taskId>` key-value context.
    async fn run_sequential(
        &self,
        tasks: &[Task],
        conditional: bool,
    ) -> Result<Vec<AgentResult>, OrchestratorError> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut excerpts: Vec<String> = Vec::new();
        let mut accumulated: HashMap<String, serde_json::Value> = HashMap::new();

        for template in tasks {
            let mut task = template.clone();
            task.previous_outputs = excerpts.clone();
            task.existing_artifacts = self.registry.all();
            if conditional {
                for (key, value) in &accumulated {
                    task.context.insert(key.clone(), value.clone());
                }
            }

            let result = self.run_task(task.clone()).await?;

            excerpts.push(truncate_excerpt(
                &result.output,
                self.config.output_excerpt_chars,
            ));
            if conditional {
                accumulated.insert(
                    format!("result_{}", task.id),
                    serde_json::Value::String(result.output.clone()),
                );
            }
            self.merge_artifacts(&result);
            results.push(result);
        }

        Ok(results)
    }

    /// Parallel execution in batches of at most `max_parallel_tasks`.
    ///
    /// Every task in a batch sees the same artifact snapshot taken at batch
    /// start; batch artifacts merge before the next batch. Failure is
    /// fail-fast: the first task error aborts siblings that have not yet
    /// settled, and their partial work is discarded.
    async fn run_parallel(&self, tasks: &[Task]) -> Result<Vec<AgentResult>, OrchestratorError> {
        let mut results = Vec::with_capacity(tasks.len());

        for batch in tasks.chunks(self.config.max_parallel_tasks.max(1)) {
            let snapshot = self.registry.all();
            tracing::debug!(batch_size = batch.len(), "parallel batch started");

            let futures = batch.iter().map(|template| {
                let mut task = template.clone();
                task.existing_artifacts = snapshot.clone();
                self.run_task(task)
            });
            let batch_results = futures::future::try_join_all(futures).await?;

            for result in &batch_results {
                self.merge_artifacts(result);
            }
            results.extend(batch_results);
        }

        Ok(results)
    }

    /// Route and execute one task with deadline enforcement and retry.
    ///
    /// Routing failure is fatal immediately; execution failures (including
    /// timeouts) retry up to `max_retries` times with a linearly increasing
    /// delay before the terminal error propagates.
    async fn run_task(&self, task: Task) -> Result<AgentResult, OrchestratorError> {
        let decision =
            self.router
                .route(&task)
                .map_err(|e| OrchestratorError::RoutingFailed {
                    task_id: task.id.clone(),
                    source: e,
                })?;
        let agent = self.router.get(&decision.agent_id).ok_or_else(|| {
            OrchestratorError::RoutingFailed {
                task_id: task.id.clone(),
                source: crate::error::RoutingError::UnknownAgent {
                    agent_id: decision.agent_id.clone(),
                },
            }
        })?;

        self.executions.lock().unwrap().insert(
            task.id.clone(),
            TaskExecution::new(&task.id, &decision.agent_id),
        );

        let max_attempts = if self.config.retry_failed_tasks {
            self.config.max_retries + 1
        } else {
            1
        };
        let timeout = Duration::from_millis(self.config.task_timeout_ms);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.mark_attempt_started(&task.id, attempt, agent.agent().max_iterations());
            let progress = self.progress_for(&task.id);

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.mark_finished(&task.id, TaskStatus::Failed, Some("cancelled".into()));
                    return Err(OrchestratorError::Cancelled);
                }
                outcome = tokio::time::timeout(timeout, agent.execute(&task, Some(progress))) => outcome,
            };

            match outcome {
                Ok(Ok(result)) => {
                    self.mark_finished(&task.id, TaskStatus::Completed, None);
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error = OrchestratorError::TaskTimeout {
                        task_id: task.id.clone(),
                        timeout_ms: self.config.task_timeout_ms,
                    }
                    .to_string();
                }
            }

            self.mark_finished(&task.id, TaskStatus::Failed, Some(last_error.clone()));
            tracing::warn!(
                task_id = %task.id,
                attempt,
                max_attempts,
                error = %last_error,
                "task attempt failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_millis(1000 * attempt as u64)).await;
            }
        }

        Err(OrchestratorError::TaskFailed {
            task_id: task.id,
            attempts: max_attempts,
            message: last_error,
        })
    }

    /// Bounded error-detection-and-fix loop against the debug agent.
    ///
    /// Each round asks for an error check; a response reporting no errors
    /// ends the loop. Otherwise the reported errors become a fix task and
    /// the next round re-checks. Any internal failure terminates the loop
    /// without failing the orchestration.
    async fn run_error_fix_loop(&self, results: &mut Vec<AgentResult>) {
        let Some(agent) = self.debug_agent.clone() else {
            return;
        };

        let summary = truncate_excerpt(
            &results
                .iter()
                .map(|r| r.output.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            self.config.output_excerpt_chars * 2,
        );

        let deadline = Duration::from_millis(self.config.task_timeout_ms);
        for round in 1..=self.config.max_fix_rounds {
            let check = Task::new(
                format!("error-check-{round}"),
                format!(
                    "Check the following work for type errors, build errors, and runtime \
                     errors. If there are none, reply with 'no errors found'.\n\n{summary}"
                ),
            );
            let report = match tokio::time::timeout(deadline, agent.execute(&check, None)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!(round, "error check failed, ending fix loop: {e}");
                    return;
                }
                Err(_) => {
                    tracing::warn!(round, "error check timed out, ending fix loop");
                    return;
                }
            };
            let found_errors = !report.output.to_lowercase().contains("no errors");
            let report_output = report.output.clone();
            self.merge_artifacts(&report);
            results.push(report);

            if !found_errors {
                tracing::debug!(round, "error-fix loop clean");
                return;
            }

            let fix = Task::new(
                format!("error-fix-{round}"),
                format!("Fix the following errors:\n\n{report_output}"),
            );
            match tokio::time::timeout(deadline, agent.execute(&fix, None)).await {
                Ok(Ok(result)) => {
                    self.merge_artifacts(&result);
                    results.push(result);
                }
                Ok(Err(e)) => {
                    tracing::warn!(round, "error fix failed, ending fix loop: {e}");
                    return;
                }
                Err(_) => {
                    tracing::warn!(round, "error fix timed out, ending fix loop");
                    return;
                }
            }
        }
    }

    /// Fold a result's artifact drafts into the registry, stamping
    /// provenance from the result's metadata.
    fn merge_artifacts(&self, result: &AgentResult) {
        for draft in &result.artifacts {
            let mut draft = draft.clone();
            draft.agent_id.get_or_insert_with(|| result.metadata.agent_id.clone());
            if draft.task_id.is_none() {
                draft.task_id = result.metadata.task_id.clone();
            }
            self.registry.upsert(draft);
        }
    }

    /// One-way progress callback wiring agent notifications into this
    /// task's execution record.
    fn progress_for(&self, task_id: &str) -> ProgressFn {
        let executions = self.executions.clone();
        let task_id = task_id.to_string();
        Arc::new(move |progress| {
            let mut executions = executions.lock().unwrap();
            let Some(execution) = executions.get_mut(&task_id) else {
                return;
            };
            match progress {
                AgentProgress::IterationStarted {
                    iteration,
                    max_iterations,
                } => {
                    execution.current_iteration = Some(iteration);
                    execution.max_iterations = Some(max_iterations);
                }
                AgentProgress::ToolStarted { name } => {
                    execution.current_tool_call = Some(name);
                }
                AgentProgress::ToolCompleted { name } => {
                    execution.current_tool_call = None;
                    execution.completed_tool_calls.push(name);
                }
            }
        })
    }

    fn mark_attempt_started(&self, task_id: &str, attempt: u32, max_iterations: usize) {
        let mut executions = self.executions.lock().unwrap();
        if let Some(execution) = executions.get_mut(task_id) {
            execution.status = TaskStatus::Running;
            execution.retries = attempt - 1;
            execution.max_iterations = Some(max_iterations);
            execution.finished_at = None;
            execution.error = None;
        }
    }

    fn mark_finished(&self, task_id: &str, status: TaskStatus, error: Option<String>) {
        let mut executions = self.executions.lock().unwrap();
        if let Some(execution) = executions.get_mut(task_id) {
            execution.status = status;
            execution.finished_at = Some(chrono::Utc::now().to_rfc3339());
            execution.error = error;
        }
    }
}

/// Convert plan steps into routable tasks, carrying the intended role as a
/// routing hint.
fn plan_to_tasks(plan: &DecomposedPlan) -> Vec<Task> {
    plan.tasks
        .iter()
        .map(|step| {
            Task::new(&step.id, &step.description).with_metadata(
                META_AGENT_ROLE,
                serde_json::Value::String(step.agent_role.clone()),
            )
        })
        .collect()
}

/// Without a plan, the objective itself is split by the heuristic line
/// parser: a multi-line objective becomes one task per line, a single-line
/// objective one task.
fn objective_to_tasks(objective: &str, workflow: WorkflowMode) -> Vec<Task> {
    let plan = parse_plan(objective, objective, workflow_strategy(workflow));
    plan_to_tasks(&plan)
}

fn workflow_strategy(workflow: WorkflowMode) -> &'static str {
    match workflow {
        WorkflowMode::Sequential => "sequential",
        WorkflowMode::Parallel => "parallel",
        WorkflowMode::Conditional => "conditional",
    }
}

/// Truncate to a character budget on a char boundary, marking the cut.
fn truncate_excerpt(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let cut: String = text.chars().take(budget).collect();
    format!("{cut}...")
}
