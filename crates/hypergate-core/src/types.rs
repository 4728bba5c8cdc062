//! Node/edge data model. Node and edge taxonomies are closed sum
//! types with a `kind` tag; behaviour that varies by kind lives in dispatch
//! tables on the enums themselves, not in a subclass hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type EdgeId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolNode {
    pub id: NodeId,
    pub server_id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub embedding: Vec<f32>,
    pub success_rate: f64,
    pub usage_count: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StaticEdgeKind {
    Sequence,
    Provides,
    Contains,
    Conditional,
}

/// A single step of a capability's `staticStructure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticStep {
    pub node: String,
    pub edge: StaticEdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub code: String,
    pub code_hash: String,
    pub tools_used: Vec<NodeId>,
    pub static_structure: Vec<StaticStep>,
    pub success_rate: f64,
    pub usage_count: u64,
    pub embedding: Vec<f32>,
    /// 0 for a plain capability; > 0 once `tools_used` includes other
    /// capabilities (a meta-capability), derived at insertion time.
    pub level: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Tool(ToolNode),
    Capability(CapabilityNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Tool(t) => t.id,
            Node::Capability(c) => c.id,
        }
    }

    pub fn embedding(&self) -> &[f32] {
        match self {
            Node::Tool(t) => &t.embedding,
            Node::Capability(c) => &c.embedding,
        }
    }

    pub fn success_rate(&self) -> f64 {
        match self {
            Node::Tool(t) => t.success_rate,
            Node::Capability(c) => c.success_rate,
        }
    }

    pub fn usage_count(&self) -> u64 {
        match self {
            Node::Tool(t) => t.usage_count,
            Node::Capability(c) => c.usage_count,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Node::Tool(t) => t.updated_at,
            Node::Capability(c) => c.updated_at,
        }
    }

    pub fn is_meta_capability(&self) -> bool {
        matches!(self, Node::Capability(c) if c.level > 0)
    }

    pub fn display_name(&self) -> &str {
        match self {
            Node::Tool(t) => &t.name,
            Node::Capability(c) => c.name.as_deref().unwrap_or(c.code_hash.as_str()),
        }
    }
}

/// The four edge kinds, each with its own cycle discipline and relative
/// contribution to `weight()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Contains,
    Dependency,
    Provides,
    Sequence,
}

impl EdgeKind {
    /// `true` for the two kinds that must never form a directed cycle.
    pub fn is_dag_strict(&self) -> bool {
        matches!(self, EdgeKind::Contains | EdgeKind::Dependency)
    }

    pub fn type_weight(&self) -> f64 {
        match self {
            EdgeKind::Dependency => 1.0,
            EdgeKind::Contains => 0.8,
            EdgeKind::Provides => 0.7,
            EdgeKind::Sequence => 0.5,
        }
    }

    pub const ALL: [EdgeKind; 4] = [
        EdgeKind::Contains,
        EdgeKind::Dependency,
        EdgeKind::Provides,
        EdgeKind::Sequence,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeSource {
    Observed,
    Inferred,
    Template,
}

impl EdgeSource {
    pub fn multiplier(&self) -> f64 {
        match self {
            EdgeSource::Observed => 1.0,
            EdgeSource::Inferred => 0.7,
            EdgeSource::Template => 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub source: EdgeSource,
    pub count: u32,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind, source: EdgeSource) -> Self {
        Self {
            from,
            to,
            kind,
            source,
            count: 1,
            updated_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// `type_weight x source_multiplier`.
    pub fn weight(&self) -> f64 {
        self.kind.type_weight() * self.source.multiplier()
    }

    /// Dijkstra edge cost used by `shortestWeightedPath`.
    pub fn cost(&self) -> f64 {
        1.0 / self.weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_precedence_matches_spec_table() {
        let dependency_observed = Edge::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EdgeKind::Dependency,
            EdgeSource::Observed,
        );
        let contains_observed = Edge::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EdgeKind::Contains,
            EdgeSource::Observed,
        );
        let sequence_observed = Edge::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EdgeKind::Sequence,
            EdgeSource::Observed,
        );
        let provides_observed = Edge::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EdgeKind::Provides,
            EdgeSource::Observed,
        );

        assert!(dependency_observed.weight() > contains_observed.weight());
        assert!(contains_observed.weight() > sequence_observed.weight());
        assert!(provides_observed.weight() > sequence_observed.weight());
    }

    #[test]
    fn dag_strict_kinds() {
        assert!(EdgeKind::Contains.is_dag_strict());
        assert!(EdgeKind::Dependency.is_dag_strict());
        assert!(!EdgeKind::Provides.is_dag_strict());
        assert!(!EdgeKind::Sequence.is_dag_strict());
    }
}
