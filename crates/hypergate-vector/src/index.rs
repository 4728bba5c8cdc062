//! Approximate nearest-neighbour search over tool/capability descriptions
//!. The core's only contract with this index is
//! that `search_tools`/`search_capabilities` return a bounded-length
//! ordered sequence of `(id, score in [0,1])`; the implementation below is a
//! brute-force cosine scan, which is exact (a strict superset of "ordered,
//! bounded, cosine"), fine at the node counts this gateway targets, and
//! easy to swap for a real ANN backend later.

use crate::embedder::{cosine_similarity, Embedder};
use dashmap::DashMap;
use hypergate_core::NodeId;
use std::sync::Arc;

/// The global score cap applied to every user-visible similarity (spec
/// §4.1), leaving headroom to express uncertainty above any search result.
pub const SCORE_CAP: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Tool,
    Capability,
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: DashMap<(IndexKind, NodeId), Vec<f32>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: DashMap::new(),
        }
    }

    pub async fn encode(&self, text: &str) -> Vec<f32> {
        self.embedder.encode(text).await
    }

    pub fn upsert(&self, kind: IndexKind, id: NodeId, embedding: Vec<f32>) {
        self.entries.insert((kind, id), embedding);
    }

    pub fn remove(&self, kind: IndexKind, id: NodeId) {
        self.entries.remove(&(kind, id));
    }

    fn search(&self, kind: IndexKind, query: &[f32], k: usize, min_score: f32) -> Vec<(NodeId, f32)> {
        let mut scored: Vec<(NodeId, f32)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| {
                let (_, id) = *entry.key();
                let raw = cosine_similarity(query, entry.value());
                (id, raw.min(SCORE_CAP).max(0.0))
            })
            .filter(|(_, score)| score.is_finite() && *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub async fn search_tools(&self, text: &str, k: usize, min_score: f32) -> Vec<(NodeId, f32)> {
        let query = self.encode(text).await;
        self.search(IndexKind::Tool, &query, k, min_score)
    }

    pub async fn search_capabilities(
        &self,
        text: &str,
        k: usize,
        min_score: f32,
    ) -> Vec<(NodeId, f32)> {
        let query = self.encode(text).await;
        self.search(IndexKind::Capability, &query, k, min_score)
    }

    pub fn search_by_embedding(
        &self,
        kind: IndexKind,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> Vec<(NodeId, f32)> {
        self.search(kind, query, k, min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalEmbedder;
    use uuid::Uuid;

    #[tokio::test]
    async fn search_returns_bounded_ordered_scores() {
        let index = VectorIndex::new(Arc::new(LocalEmbedder::default()));
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        index.upsert(IndexKind::Tool, id_a, index.encode("read a file from disk").await);
        index.upsert(IndexKind::Tool, id_b, index.encode("post a message to chat").await);

        let results = index.search_tools("read file contents", 5, 0.0).await;
        assert!(results.len() <= 5);
        assert_eq!(results[0].0, id_a);
        for (_, score) in &results {
            assert!(*score >= 0.0 && *score <= SCORE_CAP);
        }
    }

    #[tokio::test]
    async fn respects_min_score_filter() {
        let index = VectorIndex::new(Arc::new(LocalEmbedder::default()));
        let id = Uuid::new_v4();
        index.upsert(IndexKind::Tool, id, index.encode("launch a rocket").await);
        let results = index.search_tools("read a file", 5, 0.99).await;
        assert!(results.is_empty());
    }
}
