//! Pathfinder & DAG Builder. Given a ranked
//! candidate set and an intent, selects the top-K candidates, infers
//! dependency edges between them via shortest weighted path, breaks any
//! cycles the pairwise inferences would combine into, and emits a `Dag`
//! annotated with which tasks are capabilities vs raw tools.

use hypergate_core::{Dag, EdgeKind, Node, NodeId, Task, TaskKind};
use hypergate_graph::{path_len, shortest_weighted_path, SuperHyperGraph};
use hypergate_scoring::Candidate;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TOP_K: usize = 5;
/// A path of length <= this implies a dependency.
pub const MAX_DEPENDENCY_PATH_LEN: usize = 3;

struct InferredEdge {
    /// `from depends_on to` (i.e. `to` must run first).
    from: NodeId,
    to: NodeId,
    weight: f64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

fn task_kind_for(graph: &SuperHyperGraph, id: NodeId) -> TaskKind {
    match graph.get_node(id) {
        Some(Node::Capability(_)) => TaskKind::Capability,
        _ => TaskKind::Tool,
    }
}

/// Builds the DAG for a set of ranked candidates and an intent (the intent
/// string itself only matters for argument templating upstream; the
/// pathfinder only needs the candidate ids).
pub fn build_dag(graph: &SuperHyperGraph, candidates: &[Candidate], top_k: usize) -> Dag {
    let top: Vec<&Candidate> = candidates.iter().take(top_k.max(1)).collect();
    let ids: Vec<NodeId> = top.iter().map(|c| c.id).collect();

    let mut inferred: Vec<InferredEdge> = Vec::new();
    for &ci in &ids {
        for &cj in &ids {
            if ci == cj {
                continue;
            }
            // path cj -> ci of length <= 3 implies `ci dependsOn cj`.
            if let Some(path) =
                shortest_weighted_path(graph, cj, ci, &[EdgeKind::Dependency, EdgeKind::Provides])
            {
                if path_len(&path) <= MAX_DEPENDENCY_PATH_LEN && path_len(&path) > 0 {
                    let first_edge_weight = graph
                        .edges_from(path[0], EdgeKind::Dependency)
                        .into_iter()
                        .chain(graph.edges_from(path[0], EdgeKind::Provides))
                        .find(|e| e.to == path[1])
                        .map(|e| (e.weight(), e.updated_at))
                        .unwrap_or((1.0, chrono::Utc::now()));

                    inferred.push(InferredEdge {
                        from: ci,
                        to: cj,
                        weight: first_edge_weight.0,
                        updated_at: first_edge_weight.1,
                    });
                }
            }
        }
    }

    break_cycles(&mut inferred);

    let mut depends_on: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for edge in &inferred {
        depends_on.entry(edge.from).or_default().insert(edge.to);
    }

    let tasks = ids
        .iter()
        .map(|&id| {
            let deps: Vec<String> = depends_on
                .get(&id)
                .map(|set| set.iter().map(|d| d.to_string()).collect())
                .unwrap_or_default();
            Task {
                id: id.to_string(),
                tool_or_cap_id: id,
                kind: task_kind_for(graph, id),
                arguments: serde_json::Value::Null,
                depends_on: deps,
                critical: false,
                safe_to_retry: false,
            }
        })
        .collect();

    Dag { tasks }
}

/// Removes the lowest-weighted edge of any cycle found among the inferred
/// dependencies, tie-breaking by most recent `updated_at`.
/// Repeats until the edge set induces no cycle.
fn break_cycles(edges: &mut Vec<InferredEdge>) {
    loop {
        let Some(cycle_edge_idx) = find_cycle_edge(edges) else {
            break;
        };
        edges.remove(cycle_edge_idx);
    }
}

fn find_cycle_edge(edges: &[InferredEdge]) -> Option<usize> {
    // Build adjacency `from -> [(to, idx)]` and look for any cycle via DFS;
    // if found, return the index of the lowest-weight (tie: most recent)
    // edge among ones observed to close some cycle.
    let mut adj: HashMap<NodeId, Vec<(NodeId, usize)>> = HashMap::new();
    for (idx, e) in edges.iter().enumerate() {
        adj.entry(e.from).or_default().push((e.to, idx));
    }

    let nodes: HashSet<NodeId> = edges.iter().flat_map(|e| [e.from, e.to]).collect();

    for &start in &nodes {
        let mut visiting = HashSet::new();
        if let Some(cycle_edges) = dfs_find_cycle(start, &adj, &mut visiting, &mut Vec::new()) {
            return cycle_edges
                .into_iter()
                .min_by(|&a, &b| {
                    edges[a]
                        .weight
                        .partial_cmp(&edges[b].weight)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| edges[b].updated_at.cmp(&edges[a].updated_at))
                });
        }
    }
    None
}

fn dfs_find_cycle(
    node: NodeId,
    adj: &HashMap<NodeId, Vec<(NodeId, usize)>>,
    visiting: &mut HashSet<NodeId>,
    path_edges: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    if !visiting.insert(node) {
        return Some(path_edges.clone());
    }
    if let Some(neighbors) = adj.get(&node) {
        for &(next, idx) in neighbors {
            path_edges.push(idx);
            if let Some(cycle) = dfs_find_cycle(next, adj, visiting, path_edges) {
                return Some(cycle);
            }
            path_edges.pop();
        }
    }
    visiting.remove(&node);
    None
}
