//! SHGAT: multi-head attention scoring over the incidence structure of
//! tools and capabilities. Used only when a trained attention model is
//! available; otherwise callers fall back to Active Search.

use hypergate_core::{EdgeKind, Node, NodeId};
use hypergate_graph::{adamic_adar, AnalyticsCache, SuperHyperGraph};
use std::collections::HashMap;

/// Learnable fusion weights, treated as tunable parameters rather than
/// claimed-optimal defaults.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub semantic: f64,
    pub structure: f64,
    pub temporal: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            structure: 0.3,
            temporal: 0.2,
        }
    }
}

/// Whether a trained attention model backs SHGAT scoring for this gateway
/// instance. `trained = false` means every caller must fall back to Active
/// Search.
pub struct AttentionModel {
    pub trained: bool,
    pub fusion: FusionWeights,
}

impl Default for AttentionModel {
    fn default() -> Self {
        Self {
            trained: false,
            fusion: FusionWeights::default(),
        }
    }
}

/// Two-phase vertex <-> hyperedge message pass on the incidence matrix of
/// tools (vertices) x capabilities (hyperedges), flattened transitively
/// through `contains` so a meta-capability's propagated embedding folds in
/// its nested capabilities' embeddings too.
///
/// Phase 1 (V -> E): each capability's working embedding is the mean of its
/// member tools'/capabilities' embeddings (falling back to its own stored
/// embedding when it has no members indexed yet).
/// Phase 2 (E -> V): each tool's propagated embedding is the mean of the
/// working embeddings of every capability that lists it in `toolsUsed`
/// (falling back to its own embedding when it belongs to no capability).
pub fn propagate_embeddings(graph: &SuperHyperGraph) -> HashMap<NodeId, Vec<f32>> {
    let all_ids = graph.all_node_ids();
    let dim = all_ids
        .iter()
        .filter_map(|id| graph.get_node(*id))
        .map(|n| n.embedding().len())
        .find(|&len| len > 0)
        .unwrap_or(0);

    if dim == 0 {
        return HashMap::new();
    }

    let mean = |vectors: Vec<Vec<f32>>| -> Option<Vec<f32>> {
        if vectors.is_empty() {
            return None;
        }
        let mut acc = vec![0.0_f32; dim];
        for v in &vectors {
            for (a, b) in acc.iter_mut().zip(v) {
                *a += b;
            }
        }
        let n = vectors.len() as f32;
        for a in acc.iter_mut() {
            *a /= n;
        }
        Some(acc)
    };

    // Phase 1: V -> E. Resolve transitively through `contains` so a
    // meta-capability (level > 0) aggregates its nested capabilities' own
    // phase-1 embeddings, not just directly-listed tools.
    let mut capability_working: HashMap<NodeId, Vec<f32>> = HashMap::new();
    let mut order: Vec<NodeId> = Vec::new();
    for id in &all_ids {
        if let Some(Node::Capability(_)) = graph.get_node(*id) {
            order.push(*id);
        }
    }
    // Capabilities with fewer members resolve first so meta-capabilities
    // (which reference other capabilities) can read an already-computed
    // working embedding; this is a partial topological approximation that
    // is always safe because `contains` is DAG-strict.
    order.sort_by_key(|id| match graph.get_node(*id) {
        Some(Node::Capability(c)) => c.tools_used.len(),
        _ => 0,
    });

    for id in &order {
        let Some(Node::Capability(cap)) = graph.get_node(*id) else {
            continue;
        };
        let member_embeddings: Vec<Vec<f32>> = cap
            .tools_used
            .iter()
            .filter_map(|member_id| {
                capability_working
                    .get(member_id)
                    .cloned()
                    .or_else(|| graph.get_node(*member_id).map(|n| n.embedding().to_vec()))
            })
            .collect();

        let working = mean(member_embeddings).unwrap_or_else(|| cap.embedding.clone());
        capability_working.insert(*id, working);
    }

    // Phase 2: E -> V. Every node's propagated embedding is the mean of the
    // working embeddings of capabilities that directly list it, falling
    // back to its own embedding when it belongs to none.
    let mut membership: HashMap<NodeId, Vec<Vec<f32>>> = HashMap::new();
    for id in &order {
        let Some(Node::Capability(cap)) = graph.get_node(*id) else {
            continue;
        };
        let working = capability_working.get(id).cloned().unwrap_or_default();
        for member_id in &cap.tools_used {
            membership
                .entry(*member_id)
                .or_default()
                .push(working.clone());
        }
    }

    let mut propagated = HashMap::new();
    for id in &all_ids {
        let Some(node) = graph.get_node(*id) else {
            continue;
        };
        let incoming = membership.get(id).cloned().unwrap_or_default();
        let value = mean(incoming).unwrap_or_else(|| node.embedding().to_vec());
        propagated.insert(*id, value);
    }
    // Capabilities also get their own phase-1 working embedding if richer.
    for (id, working) in capability_working {
        propagated.insert(id, working);
    }

    propagated
}

/// A coarse heat-diffusion proxy: a 2-hop breadth-first decay from `node`
/// along any edge kind, `exp(-hop)` per hop, summed. Cheap stand-in for a
/// true heat kernel, adequate for ranking purposes.
pub fn heat_diffusion(graph: &SuperHyperGraph, node: NodeId, max_hops: usize) -> f64 {
    use std::collections::{HashSet, VecDeque};
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((node, 0usize));
    visited.insert(node);
    let mut heat = 0.0;

    while let Some((current, hop)) = queue.pop_front() {
        if hop >= max_hops {
            continue;
        }
        for kind in EdgeKind::ALL {
            for next in graph.neighbors(current, kind) {
                if visited.insert(next) {
                    heat += (-(hop as f64 + 1.0)).exp();
                    queue.push_back((next, hop + 1));
                }
            }
        }
    }
    heat
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Scores `candidate` for `intent_embedding` under the trained attention
/// model, or returns `None` when the model isn't trained (callers must
/// then fall back to Active Search).
pub fn attention_score(
    graph: &SuperHyperGraph,
    analytics: &AnalyticsCache,
    model: &AttentionModel,
    propagated: &HashMap<NodeId, Vec<f32>>,
    intent_embedding: &[f32],
    candidate: NodeId,
) -> Option<f64> {
    if !model.trained {
        return None;
    }

    let candidate_embedding = propagated.get(&candidate)?;
    let sem_head = hypergate_vector::cosine_similarity(intent_embedding, candidate_embedding) as f64;

    let snapshot = analytics.get(graph);
    let page_rank = snapshot.page_rank.get(&candidate).copied().unwrap_or(0.0);
    let adamic = adamic_adar(graph, candidate, 1)
        .first()
        .map(|(_, s)| *s)
        .unwrap_or(0.0);
    let struct_head = page_rank + adamic;

    let recency = 1.0; // no temporal query context at scoring time; neutral.
    let heat = heat_diffusion(graph, candidate, 2);
    let temp_head = recency + heat;

    let fused = model.fusion.semantic * sem_head
        + model.fusion.structure * struct_head
        + model.fusion.temporal * temp_head;

    let score = sigmoid(fused).min(hypergate_vector::SCORE_CAP as f64);
    if score.is_finite() {
        Some(score)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypergate_core::{CapabilityNode, Edge, EdgeSource, GatewayConfig, ToolNode};
    use chrono::Utc;
    use uuid::Uuid;

    fn tool_with_embedding(id: NodeId, embedding: Vec<f32>) -> Node {
        Node::Tool(ToolNode {
            id,
            server_id: "s".into(),
            name: "t".into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            embedding,
            success_rate: 1.0,
            usage_count: 0,
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn untrained_model_returns_none() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let analytics = AnalyticsCache::new(0.05);
        let model = AttentionModel::default();
        let propagated = propagate_embeddings(&graph);
        let id = Uuid::new_v4();
        assert!(attention_score(&graph, &analytics, &model, &propagated, &[], id).is_none());
    }

    #[test]
    fn propagation_folds_tool_embeddings_into_capability() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let tool_a = Uuid::new_v4();
        let tool_b = Uuid::new_v4();
        graph.add_node(tool_with_embedding(tool_a, vec![1.0, 0.0]));
        graph.add_node(tool_with_embedding(tool_b, vec![0.0, 1.0]));

        let cap_id = Uuid::new_v4();
        graph.add_node(Node::Capability(CapabilityNode {
            id: cap_id,
            name: Some("combo".into()),
            description: None,
            code: "".into(),
            code_hash: "hash".into(),
            tools_used: vec![tool_a, tool_b],
            static_structure: vec![],
            success_rate: 1.0,
            usage_count: 1,
            embedding: vec![0.0, 0.0],
            level: 0,
            updated_at: Utc::now(),
        }));
        graph
            .add_edge(Edge::new(tool_a, cap_id, EdgeKind::Contains, EdgeSource::Observed))
            .unwrap();

        let propagated = propagate_embeddings(&graph);
        let cap_embedding = propagated.get(&cap_id).unwrap();
        assert!((cap_embedding[0] - 0.5).abs() < 1e-6);
        assert!((cap_embedding[1] - 0.5).abs() < 1e-6);
    }
}
