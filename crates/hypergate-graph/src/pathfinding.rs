//! Weighted shortest path, using
//! Dijkstra with `cost = 1 / edge.weight` so higher-weight (more reliable /
//! more observed) edges are cheaper to traverse.

use crate::store::SuperHyperGraph;
use hypergate_core::{EdgeKind, NodeId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

// A small binary-heap entry ordered by ascending cost (Rust's BinaryHeap is
// a max-heap, so `Ord` is reversed).
#[derive(PartialEq)]
struct HeapEntry {
    cost: f64,
    node: NodeId,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Returns the node-id path from `u` to `v` inclusive, following only edges
/// whose kind is in `kinds`, or `None` if unreachable.
pub fn shortest_weighted_path(
    graph: &SuperHyperGraph,
    u: NodeId,
    v: NodeId,
    kinds: &[EdgeKind],
) -> Option<Vec<NodeId>> {
    if u == v {
        return Some(vec![u]);
    }

    let mut dist: HashMap<NodeId, f64> = HashMap::new();
    let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(u, 0.0);
    heap.push(HeapEntry { cost: 0.0, node: u });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if node == v {
            break;
        }
        if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }

        for kind in kinds {
            for edge in graph.edges_from(node, *kind) {
                let next_cost = cost + edge.cost();
                if next_cost < *dist.get(&edge.to).unwrap_or(&f64::INFINITY) {
                    dist.insert(edge.to, next_cost);
                    prev.insert(edge.to, node);
                    heap.push(HeapEntry {
                        cost: next_cost,
                        node: edge.to,
                    });
                }
            }
        }
    }

    if !dist.contains_key(&v) {
        return None;
    }

    let mut path = vec![v];
    let mut current = v;
    while current != u {
        current = *prev.get(&current)?;
        path.push(current);
    }
    path.reverse();
    Some(path)
}

/// Path length in number of hops, used by the pathfinder's "length <= 3"
/// dependency-inference rule.
pub fn path_len(path: &[NodeId]) -> usize {
    path.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SuperHyperGraph;
    use hypergate_core::{Edge, EdgeSource, GatewayConfig, Node, ToolNode};
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
            updated_at: chrono::Utc::now(),
        })
    }

    #[test]
    fn finds_shortest_path_by_cost() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [a, b, c] {
            graph.add_node(tool(id));
        }
        graph
            .add_edge(Edge::new(a, b, EdgeKind::Dependency, EdgeSource::Observed))
            .unwrap();
        graph
            .add_edge(Edge::new(b, c, EdgeKind::Dependency, EdgeSource::Observed))
            .unwrap();

        let path = shortest_weighted_path(&graph, a, c, &[EdgeKind::Dependency]).unwrap();
        assert_eq!(path, vec![a, b, c]);
        assert_eq!(path_len(&path), 2);
    }

    #[test]
    fn returns_none_when_unreachable() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph.add_node(tool(a));
        graph.add_node(tool(b));
        assert!(shortest_weighted_path(&graph, a, b, &[EdgeKind::Dependency]).is_none());
    }
}
