//! Capability Miner: turns a successful
//! user-code execution into a deduplicated, reusable `CapabilityNode`.

use chrono::Utc;
use dashmap::DashMap;
use hypergate_core::{CapabilityNode, EdgeKind, Node, NodeId, Result, StaticEdgeKind, StaticStep};
use hypergate_graph::SuperHyperGraph;
use hypergate_vector::{IndexKind, VectorIndex};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// A textual stand-in for `code` when mining is triggered by a DAG's
/// executed tool ordering rather than by `execute_code`'s user source
/// (spec §4.8: "whose request carried user code, or whose DAG exercised
/// a novel tool sequence"). Distinguishable from real code so it never
/// collides with a `codeHash` computed from an actual snippet.
pub fn serialize_tool_sequence(tools_used: &[NodeId]) -> String {
    let steps: Vec<String> = tools_used.iter().map(|id| id.to_string()).collect();
    format!("sequence:{}", steps.join("->"))
}

/// Strips `//` and `/* */` comments and collapses whitespace so
/// whitespace/comment-only edits hash identically.
pub fn normalize_code(code: &str) -> String {
    let mut without_comments = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                without_comments.push(' ');
            }
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
                without_comments.push(' ');
            }
            continue;
        }
        if c == '/' && chars.peek() == Some(&'/') {
            in_line_comment = true;
            chars.next();
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            in_block_comment = true;
            chars.next();
            continue;
        }
        without_comments.push(c);
    }

    without_comments.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn code_hash(normalized_code: &str) -> String {
    let digest = Sha256::digest(normalized_code.as_bytes());
    format!("{digest:x}")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text).trim()
}

/// Builds the capability's `staticStructure` from its tool-call ordering
///: consecutive distinct tool invocations become
/// `sequence` steps, matching the only ordering information the miner
/// observes without a full code AST.
fn static_structure_from_path(tools_used: &[NodeId]) -> Vec<StaticStep> {
    tools_used
        .iter()
        .map(|id| StaticStep {
            node: id.to_string(),
            edge: StaticEdgeKind::Sequence,
        })
        .collect()
}

pub struct CapabilityMiner {
    graph: Arc<SuperHyperGraph>,
    index: Arc<VectorIndex>,
    /// `codeHash -> NodeId` dedup index. Not derivable cheaply from the
    /// graph store alone, so the miner keeps its own.
    by_hash: DashMap<String, NodeId>,
}

impl CapabilityMiner {
    pub fn new(graph: Arc<SuperHyperGraph>, index: Arc<VectorIndex>) -> Self {
        Self {
            graph,
            index,
            by_hash: DashMap::new(),
        }
    }

    /// Mines one successful execution's code.
    /// Returns the capability id, new or reused.
    pub async fn mine(
        &self,
        code: &str,
        tools_used: &[NodeId],
        description: Option<&str>,
    ) -> Result<NodeId> {
        let normalized = normalize_code(code);
        let hash = code_hash(&normalized);

        // Step 4 runs on every mine, independent of the dedup branch below:
        // the `provides` data-flow edges reflect what this execution
        // actually observed, not whether its code was new.
        self.record_provides_edges(tools_used);

        if let Some(existing) = self.by_hash.get(&hash).map(|e| *e) {
            self.graph.record_outcome(existing, true);
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let static_structure = static_structure_from_path(tools_used);
        let level = tools_used
            .iter()
            .filter_map(|t| self.graph.get_node(*t))
            .map(|n| match n {
                Node::Capability(c) => c.level + 1,
                Node::Tool(_) => 0,
            })
            .max()
            .unwrap_or(0);

        let embed_text = description.unwrap_or_else(|| first_line(code));
        let embedding = self.index.encode(embed_text).await;

        let capability = CapabilityNode {
            id,
            name: None,
            description: description.map(|s| s.to_string()),
            code: code.to_string(),
            code_hash: hash.clone(),
            tools_used: tools_used.to_vec(),
            static_structure,
            success_rate: 1.0,
            usage_count: 1,
            embedding: embedding.clone(),
            level,
            updated_at: Utc::now(),
        };

        self.graph.add_node(Node::Capability(capability));
        self.index.upsert(IndexKind::Capability, id, embedding);
        self.by_hash.insert(hash, id);

        Ok(id)
    }

    /// Spec §4.8 step 4: `provides` edges between consecutive tool calls
    /// as observed in the executed path. Distinct from the Learning
    /// Coordinator's own `sequence` batch (§4.11) — `provides` is the
    /// data-flow relation the scoring engine and `discover(include_related)`
    /// actually read, `sequence` is raw temporal co-occurrence.
    fn record_provides_edges(&self, tools_used: &[NodeId]) {
        for pair in tools_used.windows(2) {
            if let Err(err) = self
                .graph
                .upsert_observed_edge(pair[0], pair[1], EdgeKind::Provides)
            {
                tracing::warn!(error = %err, "capability miner: failed to record observed provides edge");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_comments_and_collapses_whitespace() {
        let a = "fn x() {\n  // comment\n  let y = 1;   let z = 2;\n}";
        let b = "fn x() {\n\n\n  let y = 1;\n  let z = 2;\n}";
        assert_eq!(normalize_code(a), normalize_code(b));
    }

    #[test]
    fn block_comments_are_stripped() {
        let a = "let x = 1; /* block\nmultiline */ let y = 2;";
        let b = "let x = 1;  let y = 2;";
        assert_eq!(normalize_code(a), normalize_code(b));
    }

    #[tokio::test]
    async fn whitespace_only_variant_dedupes_to_same_capability() {
        let graph = Arc::new(SuperHyperGraph::new(&hypergate_core::GatewayConfig::default()));
        let index = Arc::new(VectorIndex::new(Arc::new(
            hypergate_vector::LocalEmbedder::default(),
        )));
        let miner = CapabilityMiner::new(graph.clone(), index);

        let code_a = "let a = 1;\nlet b = 2;";
        let code_b = "let a = 1;   let b = 2;\n\n";

        let id_a = miner.mine(code_a, &[], None).await.unwrap();
        let id_b = miner.mine(code_b, &[], None).await.unwrap();

        assert_eq!(id_a, id_b);
        let Some(Node::Capability(cap)) = graph.get_node(id_a) else {
            panic!("expected capability node");
        };
        assert_eq!(cap.usage_count, 2);
    }

    #[tokio::test]
    async fn mining_upserts_provides_edges_between_consecutive_tools() {
        let graph = Arc::new(SuperHyperGraph::new(&hypergate_core::GatewayConfig::default()));
        let index = Arc::new(VectorIndex::new(Arc::new(
            hypergate_vector::LocalEmbedder::default(),
        )));
        let miner = CapabilityMiner::new(graph.clone(), index);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        miner
            .mine("let report = read(); send(report);", &[a, b, c], None)
            .await
            .unwrap();

        assert_eq!(
            graph.neighbors(a, hypergate_core::EdgeKind::Provides),
            vec![b]
        );
        assert_eq!(
            graph.neighbors(b, hypergate_core::EdgeKind::Provides),
            vec![c]
        );
        assert!(graph
            .neighbors(a, hypergate_core::EdgeKind::Sequence)
            .is_empty());
    }

    #[tokio::test]
    async fn dedup_branch_still_records_provides_edges() {
        let graph = Arc::new(SuperHyperGraph::new(&hypergate_core::GatewayConfig::default()));
        let index = Arc::new(VectorIndex::new(Arc::new(
            hypergate_vector::LocalEmbedder::default(),
        )));
        let miner = CapabilityMiner::new(graph.clone(), index);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let code = "let x = 1;";

        miner.mine(code, &[], None).await.unwrap();
        // Same codeHash (dedup branch), but a different executed path —
        // step 4 must still run even though step 3's insert is skipped.
        miner.mine(code, &[a, b], None).await.unwrap();

        assert_eq!(
            graph.neighbors(a, hypergate_core::EdgeKind::Provides),
            vec![b]
        );
    }
}
