//! Next-step Prediction mode: suggests the next tool given a
//! running workflow's context.
//!
//! `score = 0.6*cooccurrence + 0.3*sameCommunity + 0.1*recency + 0.1*pageRank`

use crate::candidate::{discard_non_finite, rank, Candidate, CandidateKind};
use chrono::{DateTime, Utc};
use hypergate_core::{EdgeKind, Node, NodeId};
use hypergate_graph::{AnalyticsCache, SuperHyperGraph};
use std::sync::Arc;

/// Project time of 24h used to decay `recency`.
pub const RECENCY_TAU_SECONDS: f64 = 24.0 * 3600.0;

pub struct NextStepContext {
    /// The tool most recently executed in the running workflow. `None`
    /// degenerates Next-step into Active Search.
    pub current_tool: Option<NodeId>,
    pub now: DateTime<Utc>,
}

fn candidate_from_node(node: &Node, score: f64) -> Candidate {
    let kind = match node {
        Node::Tool(_) => CandidateKind::Tool,
        Node::Capability(_) => CandidateKind::Capability,
    };
    let description = match node {
        Node::Tool(t) => t.description.clone(),
        Node::Capability(c) => c.description.clone().unwrap_or_default(),
    };
    Candidate {
        id: node.id(),
        kind,
        name: node.display_name().to_string(),
        description,
        score,
        updated_at: node.updated_at(),
    }
}

/// Finds the observed edge weight/timestamp from `current` to `candidate`,
/// preferring `provides` over `sequence` when both exist (spec Open
/// Question (b): deterministic tie-break following the kind ordering of
/// §3 — contains, dependency, provides, sequence).
fn cooccurrence_edge(
    graph: &SuperHyperGraph,
    current: NodeId,
    candidate: NodeId,
) -> Option<(f64, DateTime<Utc>)> {
    for kind in [EdgeKind::Provides, EdgeKind::Sequence] {
        if let Some(edge) = graph
            .edges_from(current, kind)
            .into_iter()
            .find(|e| e.to == candidate)
        {
            return Some((edge.weight(), edge.updated_at));
        }
    }
    None
}

pub fn next_step(
    graph: &SuperHyperGraph,
    analytics: &AnalyticsCache,
    context: &NextStepContext,
    candidate_pool: &[NodeId],
) -> Vec<Candidate> {
    let Some(current) = context.current_tool.filter(|id| graph.has_node(*id)) else {
        // Empty or unknown context: caller should fall back to Active Search.
        return Vec::new();
    };

    let snapshot = analytics.get(graph);
    let max_pagerank = snapshot
        .page_rank
        .values()
        .cloned()
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let current_community = snapshot.communities.get(&current).copied();

    let mut candidates = Vec::new();
    for &candidate_id in candidate_pool {
        if candidate_id == current {
            continue;
        }
        let Some(node) = graph.get_node(candidate_id) else {
            continue; // unknown tool in context: treated as absent
        };

        let (cooccurrence, recency) = match cooccurrence_edge(graph, current, candidate_id) {
            Some((weight, updated_at)) => {
                let delta_seconds = (context.now - updated_at).num_seconds().max(0) as f64;
                let recency = (-delta_seconds / RECENCY_TAU_SECONDS).exp();
                (weight.min(1.0), recency)
            }
            None => (0.0, 0.0),
        };

        let same_community = match (current_community, snapshot.communities.get(&candidate_id)) {
            (Some(a), Some(b)) if a == b => 1.0,
            _ => 0.0,
        };

        let page_rank_norm = snapshot
            .page_rank
            .get(&candidate_id)
            .copied()
            .unwrap_or(0.0)
            / max_pagerank;

        let score = 0.6 * cooccurrence + 0.3 * same_community + 0.1 * recency + 0.1 * page_rank_norm;
        let score = score.min(hypergate_vector::SCORE_CAP as f64).max(0.0);

        candidates.push(candidate_from_node(&node, score));
    }

    rank(discard_non_finite(candidates))
}

pub type SharedAnalytics = Arc<AnalyticsCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use hypergate_core::{Edge, EdgeSource, GatewayConfig, ToolNode};
    use uuid::Uuid;

    fn tool(id: NodeId) -> Node {
        Node::Tool(ToolNode {
            id,
            server_id: "s".into(),
            name: "t".into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            embedding: vec![],
            success_rate: 1.0,
            usage_count: 0,
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn empty_context_yields_no_candidates() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let analytics = AnalyticsCache::new(0.05);
        let ctx = NextStepContext {
            current_tool: None,
            now: Utc::now(),
        };
        assert!(next_step(&graph, &analytics, &ctx, &[]).is_empty());
    }

    #[test]
    fn observed_edge_drives_cooccurrence_component() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [a, b, c] {
            graph.add_node(tool(id));
        }
        graph
            .add_edge(Edge::new(a, b, EdgeKind::Sequence, EdgeSource::Observed))
            .unwrap();

        let analytics = AnalyticsCache::new(0.05);
        let ctx = NextStepContext {
            current_tool: Some(a),
            now: Utc::now(),
        };
        let results = next_step(&graph, &analytics, &ctx, &[b, c]);
        assert_eq!(results[0].id, b);
        assert!(results[0].score > 0.0);
    }
}
