mod common;

use std::sync::Arc;

use common::{scripted_sub_agent, write_call, writing_sub_agent, ReplayBackend};
use ensemble::agent::Agent;
use ensemble::artifact::ArtifactKind;
use ensemble::backend::ModelResponse;
use ensemble::config::{compile_rules, load_config, OrchestratorConfig, PartialConfig, RuleEntry};
use ensemble::orchestration::{Orchestrator, WorkflowMode};
use ensemble::routing::{RouterConfig, TaskRouter};
use ensemble::tool::NoTools;

// ============================================================
// Full pipeline: planning -> routing -> execution -> artifacts
// ============================================================

#[tokio::test]
async fn test_sequential_pipeline_with_plan_and_artifacts() {
    common::init_tracing();
    let planner_backend = Arc::new(ReplayBackend::new(vec![ModelResponse::text(
        r#"{"name": "Release notes", "strategy": "sequential", "tasks": [
            {"id": "task-1", "agentRole": "researcher", "description": "Collect the changes", "complexity": "low"},
            {"id": "task-2", "agentRole": "writer", "description": "Draft the notes", "complexity": "high"},
            {"id": "task-3", "agentRole": "writer", "description": "Polish the draft", "complexity": "low"}
        ]}"#,
    )]));

    // The writer agent writes a file on its second task, then closes.
    let writer = writing_sub_agent(
        "writer",
        "writer",
        vec![
            ModelResponse::text("collected: three changes"),
            write_call("c1", "notes.md", "# Release notes"),
            ModelResponse::text("draft complete"),
            ModelResponse::text("polished"),
        ],
    );

    let mut router = TaskRouter::new(RouterConfig::default());
    router.register(writer);
    let mut orchestrator = Orchestrator::new(router, OrchestratorConfig::default())
        .with_planning_agent(Arc::new(Agent::new(
            "planner",
            "planner",
            planner_backend,
            Arc::new(NoTools),
        )));

    let result = orchestrator
        .execute("produce the release notes", WorkflowMode::Sequential)
        .await
        .unwrap();

    // Three task results, outputs concatenated in order.
    assert_eq!(result.results.len(), 3);
    assert_eq!(
        result.final_output,
        "collected: three changes\n\ndraft complete\n\npolished"
    );

    // One routing decision per task, all to the only registered agent.
    assert_eq!(result.routing_decisions.len(), 3);
    assert!(result.routing_decisions.iter().all(|d| d.agent_id == "writer"));

    // The complex plan (3 tasks) was materialized, and the tool-written
    // file landed in the registry.
    let plan_artifact = result.plan_artifact.as_ref().unwrap();
    assert_eq!(plan_artifact.kind, ArtifactKind::Plan);
    assert!(plan_artifact.content.contains("Draft the notes"));
    assert!(result.artifacts.iter().any(|a| a.path == "notes.md"));
    assert_eq!(result.plan.as_ref().unwrap().tasks.len(), 3);
}

// ============================================================
// Routing hints flow from plan roles through rules
// ============================================================

#[tokio::test]
async fn test_plan_roles_route_through_capability_rules() {
    let planner_backend = Arc::new(ReplayBackend::new(vec![ModelResponse::text(
        r#"{"tasks": [
            {"id": "task-1", "agentRole": "research", "description": "Find prior art"},
            {"id": "task-2", "agentRole": "coding", "description": "Implement it"}
        ]}"#,
    )]));

    let researcher = scripted_sub_agent(
        "researcher",
        "research",
        vec![ModelResponse::text("found three papers")],
    );
    let coder = scripted_sub_agent("coder", "coding", vec![ModelResponse::text("implemented")]);

    let mut router = TaskRouter::new(RouterConfig::default());
    router.register(researcher);
    router.register(coder);
    let rules = compile_rules(&[
        RuleEntry {
            name: "research-role".to_string(),
            agent_id: "researcher".to_string(),
            pattern: None,
            keywords: None,
            capability: Some("research".to_string()),
            priority: Some(8),
        },
        RuleEntry {
            name: "coding-role".to_string(),
            agent_id: "coder".to_string(),
            pattern: None,
            keywords: None,
            capability: Some("coding".to_string()),
            priority: Some(8),
        },
    ])
    .unwrap();
    for rule in rules {
        router.add_rule(rule);
    }

    let mut orchestrator = Orchestrator::new(router, OrchestratorConfig::default())
        .with_planning_agent(Arc::new(Agent::new(
            "planner",
            "planner",
            planner_backend,
            Arc::new(NoTools),
        )));

    let result = orchestrator
        .execute("research then build", WorkflowMode::Sequential)
        .await
        .unwrap();

    assert_eq!(result.routing_decisions.len(), 2);
    assert_eq!(result.routing_decisions[0].agent_id, "researcher");
    assert_eq!(result.routing_decisions[0].matched_rules, vec!["research-role"]);
    assert_eq!(result.routing_decisions[1].agent_id, "coder");
}

// ============================================================
// Parallel workflow: batch boundaries and artifact visibility
// ============================================================

#[tokio::test]
async fn test_parallel_batches_merge_artifacts_between_batches() {
    common::init_tracing();
    // Five tasks, batches of two. Every task writes one file then closes.
    let worker = writing_sub_agent(
        "worker",
        "worker",
        vec![
            write_call("c1", "a.txt", "a"),
            ModelResponse::text("a done"),
            write_call("c2", "b.txt", "b"),
            ModelResponse::text("b done"),
            write_call("c3", "c.txt", "c"),
            ModelResponse::text("c done"),
            write_call("c4", "d.txt", "d"),
            ModelResponse::text("d done"),
            write_call("c5", "e.txt", "e"),
            ModelResponse::text("e done"),
        ],
    );

    let mut router = TaskRouter::new(RouterConfig::default());
    router.register(worker);
    let mut orchestrator = Orchestrator::new(
        router,
        OrchestratorConfig {
            max_parallel_tasks: 2,
            ..Default::default()
        },
    );

    let result = orchestrator
        .execute(
            "1. write a\n2. write b\n3. write c\n4. write d\n5. write e",
            WorkflowMode::Parallel,
        )
        .await
        .unwrap();

    assert_eq!(result.results.len(), 5);
    assert_eq!(result.artifacts.len(), 5);
    assert_eq!(result.routing_decisions.len(), 5);

    // All five files landed in the registry at version 1.
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        let artifact = result.artifacts.iter().find(|a| a.path == name).unwrap();
        assert_eq!(artifact.version, 1);
        assert_eq!(artifact.metadata.agent_id.as_deref(), Some("worker"));
    }
}

// ============================================================
// Retry behavior
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    use ensemble::backend::{ChatMessage, ModelBackend};
    use ensemble::error::BackendError;
    use ensemble::tool::ToolDefinition;
    use std::sync::Mutex;

    // Fails once, then succeeds.
    struct FlakyBackend {
        attempts: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl ModelBackend for FlakyBackend {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelResponse, BackendError> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if *attempts == 1 {
                Err(BackendError::RequestFailed("transient".to_string()))
            } else {
                Ok(ModelResponse::text("recovered"))
            }
        }
    }

    let backend = Arc::new(FlakyBackend {
        attempts: Mutex::new(0),
    });
    let mut router = TaskRouter::new(RouterConfig::default());
    router.register(Arc::new(ensemble::agent::SubAgent::new(
        Agent::new("worker", "worker", backend, Arc::new(NoTools)),
        "worker",
    )));
    let mut orchestrator = Orchestrator::new(router, OrchestratorConfig::default());

    let result = orchestrator
        .execute("one task", WorkflowMode::Sequential)
        .await
        .unwrap();

    assert_eq!(result.final_output, "recovered");
    let executions = orchestrator.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].retries, 1);
}

// ============================================================
// Config file wiring
// ============================================================

#[tokio::test]
async fn test_orchestrator_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ensemble.toml");
    std::fs::write(
        &path,
        r#"
[orchestrator]
max_parallel_tasks = 2
max_retries = 0
retry_failed_tasks = false

[router]
default_agent_id = "generalist"

[[router.rules]]
name = "writing"
agent_id = "writer"
keywords = ["draft", "write"]
priority = 7
"#,
    )
    .unwrap();

    let config = load_config(Some(&path), PartialConfig::default());
    assert_eq!(config.orchestrator.max_parallel_tasks, 2);
    assert!(!config.orchestrator.retry_failed_tasks);

    let mut router = TaskRouter::new(config.router.clone());
    router.register(scripted_sub_agent(
        "writer",
        "writer",
        vec![ModelResponse::text("drafted")],
    ));
    router.register(scripted_sub_agent(
        "generalist",
        "generalist",
        vec![ModelResponse::text("handled")],
    ));
    for rule in compile_rules(&config.rules).unwrap() {
        router.add_rule(rule);
    }

    let mut orchestrator = Orchestrator::new(router, config.orchestrator.clone());
    let result = orchestrator
        .execute("draft the announcement", WorkflowMode::Sequential)
        .await
        .unwrap();

    assert_eq!(result.routing_decisions.len(), 1);
    assert_eq!(result.routing_decisions[0].agent_id, "writer");
    assert_eq!(result.routing_decisions[0].matched_rules, vec!["writing"]);
}

// ============================================================
// Artifact sink persistence
// ============================================================

#[tokio::test]
async fn test_artifact_sink_persists_outside_the_orchestration() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let worker = writing_sub_agent(
        "worker",
        "worker",
        vec![
            write_call("c1", "report.md", "# Report"),
            ModelResponse::text("saved"),
        ],
    );
    let mut router = TaskRouter::new(RouterConfig::default());
    router.register(worker);

    let sink_root = root.clone();
    let mut orchestrator = Orchestrator::new(router, OrchestratorConfig::default())
        .with_artifact_sink(Arc::new(move |artifact| {
            std::fs::write(sink_root.join(&artifact.filename), &artifact.content)?;
            Ok(())
        }));

    orchestrator
        .execute("write the report", WorkflowMode::Sequential)
        .await
        .unwrap();

    let persisted = std::fs::read_to_string(root.join("report.md")).unwrap();
    assert_eq!(persisted, "# Report");
}

// ============================================================
// Fatal failures surface with context
// ============================================================

#[tokio::test]
async fn test_no_agents_is_a_contextual_error() {
    let router = TaskRouter::new(RouterConfig::default());
    let mut orchestrator = Orchestrator::new(router, OrchestratorConfig::default());

    let err = orchestrator
        .execute("anything", WorkflowMode::Sequential)
        .await
        .unwrap_err();

    let chain = format!("{err:#}");
    assert!(chain.contains("Orchestrator execution failed"));
    assert!(chain.contains("No eligible agent"));
}
