//! Active Search mode: `score = semantic x reliability`,
//! triggered by `discover(intent)` with no running-workflow context, and
//! used by `execute` for active target selection.

use crate::candidate::{discard_non_finite, rank, Candidate, CandidateKind};
use hypergate_core::Node;
use hypergate_graph::SuperHyperGraph;
use hypergate_vector::{IndexKind, VectorIndex, SCORE_CAP};

pub fn reliability(success_rate: f64) -> f64 {
    if success_rate < 0.5 {
        0.1
    } else if success_rate <= 0.9 {
        1.0
    } else {
        1.2
    }
}

fn node_to_candidate(graph: &SuperHyperGraph, id: hypergate_core::NodeId, semantic: f32) -> Option<Candidate> {
    let node = graph.get_node(id)?;
    let score = (semantic as f64) * reliability(node.success_rate());
    let score = score.min(SCORE_CAP as f64).max(0.0);
    let kind = match &node {
        Node::Tool(_) => CandidateKind::Tool,
        Node::Capability(_) => CandidateKind::Capability,
    };
    let description = match &node {
        Node::Tool(t) => t.description.clone(),
        Node::Capability(c) => c.description.clone().unwrap_or_default(),
    };
    Some(Candidate {
        id,
        kind,
        name: node.display_name().to_string(),
        description,
        score,
        updated_at: node.updated_at(),
    })
}

/// Optional filter on the search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<CandidateKind>,
    pub min_score: f64,
}

pub async fn active_search(
    graph: &SuperHyperGraph,
    index: &VectorIndex,
    intent: &str,
    limit: usize,
    filter: &SearchFilter,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if !matches!(filter.kind, Some(CandidateKind::Capability)) {
        for (id, score) in index
            .search_tools(intent, limit.max(1) * 4, 0.0)
            .await
        {
            if let Some(c) = node_to_candidate(graph, id, score) {
                candidates.push(c);
            }
        }
    }

    if !matches!(filter.kind, Some(CandidateKind::Tool)) {
        for (id, score) in index
            .search_capabilities(intent, limit.max(1) * 4, 0.0)
            .await
        {
            if let Some(c) = node_to_candidate(graph, id, score) {
                candidates.push(c);
            }
        }
    }

    let candidates = discard_non_finite(candidates);
    let mut ranked = rank(candidates);
    ranked.retain(|c| c.score >= filter.min_score);
    ranked.truncate(limit);
    ranked
}

/// `IndexKind` is re-exported here only so call sites that already match on
/// `CandidateKind` can cheaply translate without a second import.
pub fn index_kind_for(kind: CandidateKind) -> IndexKind {
    match kind {
        CandidateKind::Tool => IndexKind::Tool,
        CandidateKind::Capability => IndexKind::Capability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliability_bands_match_spec() {
        assert_eq!(reliability(0.2), 0.1);
        assert_eq!(reliability(0.5), 1.0);
        assert_eq!(reliability(0.9), 1.0);
        assert_eq!(reliability(0.95), 1.2);
    }
}
