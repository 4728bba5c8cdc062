//! End-to-end scenarios exercising the public `GatewayApp` surface
//! `HyperGateServer` wraps, against the in-process
//! `MockDownstreamClient`/`MockSandboxClient` fixtures.

use hypergate_core::{GatewayConfig, Node, ToolNode};
use hypergate_mcp::app::GatewayApp;
use hypergate_mcp::downstream::MockDownstreamClient;
use hypergate_mcp::sandbox::MockSandboxClient;
use hypergate_mcp::wire::{
    DagDto, ExecuteCodeRequest, ExecuteDagConfig, ExecuteDagRequest, TaskDto, WorkflowEnvelope,
};
use hypergate_vector::IndexKind;
use serde_json::json;
use std::sync::Arc;

/// Registers a tool node in both the graph and the vector index, keyed so
/// `server_id:name` matches a `MockDownstreamClient` fixture.
async fn seed_tool(app: &GatewayApp, server_id: &str, name: &str, description: &str) -> uuid::Uuid {
    seed_tool_with_success_rate(app, server_id, name, description, 0.95).await
}

async fn seed_tool_with_success_rate(
    app: &GatewayApp,
    server_id: &str,
    name: &str,
    description: &str,
    success_rate: f64,
) -> uuid::Uuid {
    let id = uuid::Uuid::new_v4();
    let embedding = app.index.encode(description).await;
    app.graph.add_node(Node::Tool(ToolNode {
        id,
        server_id: server_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({}),
        embedding: embedding.clone(),
        success_rate,
        usage_count: 0,
        updated_at: chrono::Utc::now(),
    }));
    app.index.upsert(IndexKind::Tool, id, embedding);
    id
}

fn test_app() -> GatewayApp {
    GatewayApp::with_collaborators(
        GatewayConfig::default(),
        Arc::new(MockDownstreamClient::default()),
        Arc::new(MockSandboxClient::new()),
    )
}

/// S1: discover surfaces a registered tool close to the intent.
#[tokio::test]
async fn discover_surfaces_matching_tool() {
    let app = test_app();
    seed_tool(&app, "fs", "read_file", "read the contents of a file from disk").await;
    seed_tool(&app, "chat", "post", "post a message to a chat channel").await;

    let results = app
        .discover("read a file's contents", &Default::default(), 5, false)
        .await;

    assert!(!results.is_empty());
    assert_eq!(results[0].name, "read_file");
}

/// S2: an explicit single-task DAG against a safe tool runs straight to
/// completion without any HIL gate.
#[tokio::test]
async fn execute_dag_runs_explicit_safe_task_to_completion() {
    let app = test_app();
    let tool_id = seed_tool(&app, "fs", "read_file", "read the contents of a file from disk").await;

    let request = ExecuteDagRequest {
        workflow: Some(DagDto {
            tasks: vec![TaskDto {
                id: "t1".into(),
                tool_or_cap_id: tool_id.to_string(),
                kind: Some("tool".into()),
                arguments: json!({ "path": "/tmp/x.txt" }),
                depends_on: vec![],
                critical: None,
                safe_to_retry: true,
            }],
        }),
        intent: None,
        config: ExecuteDagConfig::default(),
    };

    let envelope = app.execute_dag(request).await.expect("workflow runs");
    match envelope {
        WorkflowEnvelope::Complete { layer_results, .. } => {
            assert_eq!(layer_results.len(), 1);
            assert_eq!(layer_results[0].len(), 1);
            assert!(layer_results[0][0].success);
        }
        other => panic!("expected Complete, got {other:?}"),
    }
}

/// S3: a multi-layer DAG (list_dir -> parse_xml depending on it) executes
/// both layers and both tasks succeed.
#[tokio::test]
async fn execute_dag_runs_dependent_layers_in_order() {
    let app = test_app();
    let list_id = seed_tool(&app, "fs", "list_dir", "list files in a directory").await;
    let parse_id = seed_tool(&app, "fs", "parse_xml", "parse a set of xml files").await;

    let request = ExecuteDagRequest {
        workflow: Some(DagDto {
            tasks: vec![
                TaskDto {
                    id: "list".into(),
                    tool_or_cap_id: list_id.to_string(),
                    kind: Some("tool".into()),
                    arguments: json!({ "path": "/tmp" }),
                    depends_on: vec![],
                    critical: None,
                    safe_to_retry: true,
                },
                TaskDto {
                    id: "parse".into(),
                    tool_or_cap_id: parse_id.to_string(),
                    kind: Some("tool".into()),
                    arguments: json!({ "files": ["a.xml", "b.xml"] }),
                    depends_on: vec!["list".into()],
                    critical: None,
                    safe_to_retry: true,
                },
            ],
        }),
        intent: None,
        config: ExecuteDagConfig::default(),
    };

    let envelope = app.execute_dag(request).await.expect("workflow runs");
    match envelope {
        WorkflowEnvelope::Complete { layer_results, .. } => {
            assert_eq!(layer_results.len(), 2);
            assert!(layer_results.iter().flatten().all(|t| t.success));
        }
        other => panic!("expected Complete, got {other:?}"),
    }
}

/// S4: a task naming a destructive tool (classified `Dangerous` per
/// §4.9's keyword list) is inferred `critical` and pauses the workflow at
/// a `decision_required` checkpoint instead of running straight through.
#[tokio::test]
async fn destructive_task_without_explicit_critical_flag_requires_approval() {
    let app = test_app();
    let drop_id = seed_tool(&app, "db", "drop_table", "drop a database table permanently").await;

    let request = ExecuteDagRequest {
        workflow: Some(DagDto {
            tasks: vec![TaskDto {
                id: "drop".into(),
                tool_or_cap_id: drop_id.to_string(),
                kind: Some("tool".into()),
                arguments: json!({ "table": "users" }),
                depends_on: vec![],
                critical: None,
                safe_to_retry: false,
            }],
        }),
        intent: None,
        config: ExecuteDagConfig::default(),
    };

    let envelope = app.execute_dag(request).await.expect("workflow starts");
    match envelope {
        WorkflowEnvelope::DecisionRequired { task_id, .. } => assert_eq!(task_id, "drop"),
        other => panic!("expected DecisionRequired for a dangerous task, got {other:?}"),
    }
}

/// S5: approving the pending decision lets the destructive task run and
/// the workflow complete.
#[tokio::test]
async fn approving_decision_completes_the_workflow() {
    let app = test_app();
    let drop_id = seed_tool(&app, "db", "drop_table", "drop a database table permanently").await;

    let request = ExecuteDagRequest {
        workflow: Some(DagDto {
            tasks: vec![TaskDto {
                id: "drop".into(),
                tool_or_cap_id: drop_id.to_string(),
                kind: Some("tool".into()),
                arguments: json!({ "table": "users" }),
                depends_on: vec![],
                critical: None,
                safe_to_retry: false,
            }],
        }),
        intent: None,
        config: ExecuteDagConfig::default(),
    };

    let envelope = app.execute_dag(request).await.expect("workflow starts");
    let (workflow_id, checkpoint_id) = match envelope {
        WorkflowEnvelope::DecisionRequired {
            workflow_id,
            checkpoint_id,
            ..
        } => (workflow_id, checkpoint_id),
        other => panic!("expected DecisionRequired, got {other:?}"),
    };
    let workflow_id = workflow_id.parse().unwrap();

    let envelope = app
        .approval_response(workflow_id, checkpoint_id, true, None)
        .await
        .expect("approval resumes the workflow");

    match envelope {
        WorkflowEnvelope::Complete { layer_results, .. } => {
            assert!(layer_results.iter().flatten().all(|t| t.success));
        }
        other => panic!("expected Complete after approval, got {other:?}"),
    }
}

/// S6: `execute_code` runs sandboxed code against the RPC bridge and mines
/// a capability out of the observed tool-call sequence.
#[tokio::test]
async fn execute_code_runs_and_mines_a_capability() {
    let app = test_app();
    let read_id = seed_tool(&app, "fs", "read_file", "read the contents of a file from disk").await;

    let code = format!("{read_id} {{\"path\": \"/tmp/report.txt\"}}");
    let response = app
        .execute_code(ExecuteCodeRequest {
            code,
            intent: Some("read a report file".into()),
            context: json!({}),
            sandbox_config: json!({}),
        })
        .await
        .expect("execute_code succeeds");

    assert_eq!(response.tools_called, vec![read_id.to_string()]);
    assert!(response.capability_id.is_some());
}

/// A tool with a poor track record drags its candidate score (semantic x
/// reliability) low enough to miss the adaptive threshold even with a
/// near-exact semantic match, so the intent-only request degenerates to a
/// `suggestion` rather than spawning a workflow on an unreliable tool.
#[tokio::test]
async fn execute_dag_from_intent_on_unreliable_tool_suggests_instead_of_running() {
    let app = test_app();
    seed_tool_with_success_rate(
        &app,
        "chat",
        "post",
        "post a message to a chat channel",
        0.2,
    )
    .await;

    let request = ExecuteDagRequest {
        workflow: None,
        intent: Some("post a message to a chat channel".into()),
        config: ExecuteDagConfig::default(),
    };

    let envelope = app.execute_dag(request).await.expect("intent-only request answers");
    assert!(matches!(envelope, WorkflowEnvelope::Suggestion { .. }));
}
