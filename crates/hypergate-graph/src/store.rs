//! SuperHyperGraph Store. Owns every node and
//! edge record; every other component only ever holds ids (spec Design
//! Notes, "Pointer-graph ownership"). Mutating operations are serialised by
//! a single-writer discipline (a crate-level `parking_lot::Mutex` guards the
//! write path) while reads go straight to the lock-free `DashMap`s (spec
//! §5).

use crate::edge_validator::{AdjacencyView, EdgeValidator};
use chrono::Utc;
use dashmap::DashMap;
use hypergate_core::{Edge, EdgeKind, EdgeSource, GatewayConfig, GatewayError, Node, NodeId, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Serialisable projection of the graph for persistence / resume.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

pub struct SuperHyperGraph {
    nodes: DashMap<NodeId, Node>,
    /// Outgoing adjacency keyed by (from, kind).
    out_adj: DashMap<(NodeId, EdgeKind), Vec<Edge>>,
    /// Ids of predecessors keyed by (to, kind), for ancestry queries.
    in_adj: DashMap<(NodeId, EdgeKind), Vec<NodeId>>,
    write_lock: Mutex<()>,
    edge_count: AtomicU64,
    promotion_threshold: u32,
}

impl SuperHyperGraph {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            nodes: DashMap::new(),
            out_adj: DashMap::new(),
            in_adj: DashMap::new(),
            write_lock: Mutex::new(()),
            edge_count: AtomicU64::new(0),
            promotion_threshold: config.edge_promotion_threshold,
        }
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count.load(Ordering::Relaxed)
    }

    // ---- nodes --------------------------------------------------------

    pub fn add_node(&self, node: Node) {
        let _guard = self.write_lock.lock();
        self.nodes.insert(node.id(), node);
    }

    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.nodes.get(&id).map(|n| n.clone())
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn all_node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|e| *e.key()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Records a tool/capability outcome on the node's rolling stats. Used
    /// by the learning coordinator (C11) after every task completion.
    pub fn record_outcome(&self, id: NodeId, success: bool) {
        let _guard = self.write_lock.lock();
        if let Some(mut entry) = self.nodes.get_mut(&id) {
            const ALPHA: f64 = 0.1;
            match entry.value_mut() {
                Node::Tool(t) => {
                    t.usage_count += 1;
                    let obs = if success { 1.0 } else { 0.0 };
                    t.success_rate = t.success_rate * (1.0 - ALPHA) + obs * ALPHA;
                    t.updated_at = Utc::now();
                }
                Node::Capability(c) => {
                    c.usage_count += 1;
                    let obs = if success { 1.0 } else { 0.0 };
                    c.success_rate = c.success_rate * (1.0 - ALPHA) + obs * ALPHA;
                    c.updated_at = Utc::now();
                }
            }
        }
    }

    // ---- edges ----------------------------------------------------------

    /// Inserts a brand-new edge, delegating DAG-strict kinds to the Edge
    /// Validator. Fails with `CycleRejected` without mutating
    /// state if the kind is DAG-strict and the insert would close a cycle.
    pub fn add_edge(&self, edge: Edge) -> Result<()> {
        let _guard = self.write_lock.lock();
        EdgeValidator::check(self, edge.from, edge.to, edge.kind)?;
        self.insert_edge_locked(edge);
        Ok(())
    }

    fn insert_edge_locked(&self, edge: Edge) {
        self.out_adj
            .entry((edge.from, edge.kind))
            .or_default()
            .push(edge.clone());
        self.in_adj
            .entry((edge.to, edge.kind))
            .or_default()
            .push(edge.from);
        self.edge_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments `count` on an existing observed-temporal edge, or creates
    /// one at `count = 1`; promotes `inferred -> observed` once `count`
    /// reaches the configured threshold.
    pub fn upsert_observed_edge(&self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(mut edges) = self.out_adj.get_mut(&(from, kind)) {
            if let Some(existing) = edges.iter_mut().find(|e| e.to == to) {
                existing.count += 1;
                existing.updated_at = Utc::now();
                if existing.count >= self.promotion_threshold
                    && !matches!(existing.source, EdgeSource::Observed)
                {
                    existing.source = EdgeSource::Observed;
                }
                return Ok(());
            }
        }

        // No existing edge: validate (only matters for DAG-strict kinds)
        // and insert fresh as already-observed (this call is itself an
        // observation).
        EdgeValidator::check(self, from, to, kind)?;
        self.insert_edge_locked(Edge::new(from, to, kind, EdgeSource::Observed));
        Ok(())
    }

    pub fn neighbors(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        self.out_adj
            .get(&(id, kind))
            .map(|v| v.iter().map(|e| e.to).collect())
            .unwrap_or_default()
    }

    pub fn edges_from(&self, id: NodeId, kind: EdgeKind) -> Vec<Edge> {
        self.out_adj.get(&(id, kind)).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn reverse_neighbors(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        self.in_adj.get(&(id, kind)).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn edges_from_any_kind(&self, id: NodeId, kinds: &[EdgeKind]) -> Vec<Edge> {
        kinds.iter().flat_map(|k| self.edges_from(id, *k)).collect()
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.out_adj.iter().flat_map(|e| e.value().clone()).collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.iter().map(|e| e.value().clone()).collect(),
            edges: self.all_edges(),
        }
    }

    pub fn restore(&self, snapshot: GraphSnapshot) {
        let _guard = self.write_lock.lock();
        self.nodes.clear();
        self.out_adj.clear();
        self.in_adj.clear();
        self.edge_count.store(0, Ordering::Relaxed);
        for node in snapshot.nodes {
            self.nodes.insert(node.id(), node);
        }
        for edge in snapshot.edges {
            self.insert_edge_locked(edge);
        }
    }

    /// All (tool/capability) neighbours discoverable as a non-strict union,
    /// used by the scoring engine's community/cooccurrence lookups.
    pub fn all_neighbor_kinds(&self, id: NodeId) -> HashSet<NodeId> {
        EdgeKind::ALL
            .iter()
            .flat_map(|k| self.neighbors(id, *k))
            .collect()
    }
}

impl AdjacencyView for SuperHyperGraph {
    fn out_neighbors(&self, node: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        self.neighbors(node, kind)
    }
}

pub type SharedGraph = Arc<SuperHyperGraph>;

#[cfg(test)]
mod tests {
    use super::*;
    use hypergate_core::ToolNode;
    use uuid::Uuid;

    fn tool(id: NodeId) -> Node {
        Node::Tool(ToolNode {
            id,
            server_id: "srv".into(),
            name: "tool".into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            embedding: vec![0.0; 4],
            success_rate: 1.0,
            usage_count: 0,
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn rejects_cycle_and_preserves_prior_state() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        graph.add_node(tool(a));
        graph.add_node(tool(b));
        graph
            .add_edge(Edge::new(a, b, EdgeKind::Contains, EdgeSource::Observed))
            .unwrap();

        let err = graph.add_edge(Edge::new(b, a, EdgeKind::Contains, EdgeSource::Observed));
        assert!(err.is_err());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn upsert_observed_edge_is_idempotent_in_identity_but_increments_count() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        graph.add_node(tool(a));
        graph.add_node(tool(b));

        for _ in 0..3 {
            graph.upsert_observed_edge(a, b, EdgeKind::Sequence).unwrap();
        }

        let edges = graph.edges_from(a, EdgeKind::Sequence);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].count, 3);
    }

    #[test]
    fn provides_allows_cycles() {
        let graph = SuperHyperGraph::new(&GatewayConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        graph.add_node(tool(a));
        graph.add_node(tool(b));
        graph
            .add_edge(Edge::new(a, b, EdgeKind::Provides, EdgeSource::Observed))
            .unwrap();
        assert!(graph
            .add_edge(Edge::new(b, a, EdgeKind::Provides, EdgeSource::Observed))
            .is_ok());
    }
}
