//! Replanner: mid-workflow DAG augmentation
//! driven by new intent and discovered context.

use crate::pathfinder::{build_dag, DEFAULT_TOP_K};
use hypergate_core::{Dag, EdgeKind, GatewayError, NodeId, Result, Task, TaskId};
use hypergate_graph::SuperHyperGraph;
use hypergate_scoring::{SearchFilter, ScoringEngine};

pub struct ReplanRequest<'a> {
    pub current_dag: &'a Dag,
    pub completed_task_ids: &'a [TaskId],
    pub new_requirement: &'a str,
    pub available_context: &'a serde_json::Value,
}

pub struct ReplanOutcome {
    pub dag: Dag,
    pub new_task_ids: Vec<TaskId>,
}

/// Builds `new_requirement + summary(available_context)` into a single
/// sub-intent string fed to Active Search.
fn build_sub_intent(new_requirement: &str, available_context: &serde_json::Value) -> String {
    let summary = summarize_context(available_context);
    if summary.is_empty() {
        new_requirement.to_string()
    } else {
        format!("{new_requirement} ({summary})")
    }
}

fn summarize_context(context: &serde_json::Value) -> String {
    match context {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", summarize_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Null => String::new(),
        other => summarize_value(other),
    }
}

fn summarize_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => format!("{} item(s)", items.len()),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves `dependsOn` for a freshly discovered task by matching
/// `provides` edges from already-completed tasks' tools into the new
/// task's tool.
fn rewire_dependencies(
    graph: &SuperHyperGraph,
    completed_tool_ids: &[(TaskId, NodeId)],
    new_tool_id: NodeId,
) -> Vec<TaskId> {
    completed_tool_ids
        .iter()
        .filter(|(_, tool_id)| {
            graph
                .edges_from(*tool_id, EdgeKind::Provides)
                .iter()
                .any(|e| e.to == new_tool_id)
        })
        .map(|(task_id, _)| task_id.clone())
        .collect()
}

/// Runs the replan: Active Search on the sub-intent, pathfinder build for
/// new tasks, dependency rewiring against completed tasks, append, and
/// re-validation of the combined DAG. Only additions and dependency
/// rewiring against completed tasks are allowed; completed tasks are
/// never deleted or replaced.
pub async fn replan(
    graph: &SuperHyperGraph,
    scoring: &ScoringEngine,
    request: ReplanRequest<'_>,
) -> Result<ReplanOutcome> {
    let sub_intent = build_sub_intent(request.new_requirement, request.available_context);

    let candidates = scoring
        .discover(&sub_intent, DEFAULT_TOP_K, &SearchFilter::default())
        .await;

    if candidates.is_empty() {
        return Ok(ReplanOutcome {
            dag: request.current_dag.clone(),
            new_task_ids: Vec::new(),
        });
    }

    let completed_tool_ids: Vec<(TaskId, NodeId)> = request
        .completed_task_ids
        .iter()
        .filter_map(|id| {
            request
                .current_dag
                .task(id)
                .map(|t| (id.clone(), t.tool_or_cap_id))
        })
        .collect();

    let discovered = build_dag(graph, &candidates, DEFAULT_TOP_K);
    let existing_ids: std::collections::HashSet<TaskId> = request
        .current_dag
        .tasks
        .iter()
        .map(|t| t.id.clone())
        .collect();

    let mut new_tasks: Vec<Task> = Vec::new();
    for mut task in discovered.tasks {
        if existing_ids.contains(&task.id) {
            continue; // already planned/executed; never replace or delete.
        }
        let mut deps = rewire_dependencies(graph, &completed_tool_ids, task.tool_or_cap_id);
        deps.extend(task.depends_on.drain(..));
        deps.sort();
        deps.dedup();
        task.depends_on = deps;
        new_tasks.push(task);
    }

    let mut combined = request.current_dag.clone();
    let new_task_ids: Vec<TaskId> = new_tasks.iter().map(|t| t.id.clone()).collect();
    combined.tasks.extend(new_tasks);

    if combined.layers().is_none() {
        return Err(GatewayError::CycleRejected(
            "replan produced a DAG with a dependency cycle against completed tasks".to_string(),
        ));
    }

    Ok(ReplanOutcome {
        dag: combined,
        new_task_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypergate_core::{Edge, EdgeSource, GatewayConfig, Node, TaskKind, ToolNode};
    use hypergate_vector::{IndexKind, LocalEmbedder, VectorIndex};
    use hypergate_graph::AnalyticsCache;
    use std::sync::Arc;
    use uuid::Uuid;

    fn tool(id: NodeId, name: &str) -> Node {
        Node::Tool(ToolNode {
            id,
            server_id: "s".into(),
            name: name.into(),
            description: format!("{name} description"),
            input_schema: serde_json::json!({}),
            embedding: vec![],
            success_rate: 1.0,
            usage_count: 0,
            updated_at: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn replan_appends_tasks_dependent_on_completed_provider() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let list_dir = Uuid::new_v4();
        let parse_xml = Uuid::new_v4();
        graph.add_node(tool(list_dir, "fs_list_dir"));
        graph.add_node(tool(parse_xml, "xml_parse"));
        graph
            .add_edge(Edge::new(list_dir, parse_xml, EdgeKind::Provides, EdgeSource::Observed))
            .unwrap();

        let index = Arc::new(VectorIndex::new(Arc::new(LocalEmbedder::default())));
        index.upsert(
            IndexKind::Tool,
            parse_xml,
            index.encode("parse discovered xml files").await,
        );

        let graph = Arc::new(graph);
        let analytics = Arc::new(AnalyticsCache::new(0.05));
        let scoring = ScoringEngine::new(graph.clone(), index, analytics);

        let current_dag = Dag {
            tasks: vec![Task {
                id: list_dir.to_string(),
                tool_or_cap_id: list_dir,
                kind: TaskKind::Tool,
                arguments: serde_json::Value::Null,
                depends_on: vec![],
                critical: false,
                safe_to_retry: false,
            }],
        };

        let outcome = replan(
            &graph,
            &scoring,
            ReplanRequest {
                current_dag: &current_dag,
                completed_task_ids: &[list_dir.to_string()],
                new_requirement: "parse discovered XML",
                available_context: &serde_json::json!({"files": ["a.xml"]}),
            },
        )
        .await
        .unwrap();

        assert!(!outcome.new_task_ids.is_empty());
        let new_task = outcome.dag.task(&parse_xml.to_string()).unwrap();
        assert!(new_task.depends_on.contains(&list_dir.to_string()));
    }
}
