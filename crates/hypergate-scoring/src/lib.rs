//! Scoring Engine: Active Search, Next-step Prediction
//! and SHGAT attention scoring.

pub mod active_search;
pub mod candidate;
pub mod next_step;
pub mod shgat;

pub use active_search::{active_search, reliability, SearchFilter};
pub use candidate::{discard_non_finite, rank, Candidate, CandidateKind};
pub use next_step::{next_step, NextStepContext, RECENCY_TAU_SECONDS};
pub use shgat::{attention_score, heat_diffusion, propagate_embeddings, AttentionModel, FusionWeights};

use hypergate_graph::{AnalyticsCache, SuperHyperGraph};
use hypergate_vector::VectorIndex;
use std::sync::Arc;

/// Facade dispatching to whichever of the three modes
/// applies to the caller's request shape.
pub struct ScoringEngine {
    pub graph: Arc<SuperHyperGraph>,
    pub index: Arc<VectorIndex>,
    pub analytics: Arc<AnalyticsCache>,
    pub attention: AttentionModel,
}

impl ScoringEngine {
    pub fn new(graph: Arc<SuperHyperGraph>, index: Arc<VectorIndex>, analytics: Arc<AnalyticsCache>) -> Self {
        Self {
            graph,
            index,
            analytics,
            attention: AttentionModel::default(),
        }
    }

    pub async fn discover(&self, intent: &str, limit: usize, filter: &SearchFilter) -> Vec<Candidate> {
        active_search(&self.graph, &self.index, intent, limit, filter).await
    }

    /// Next-step prediction that degenerates to Active Search when the
    /// context is empty or names an unknown tool.
    pub async fn suggest_next(
        &self,
        intent: &str,
        context: &NextStepContext,
        candidate_pool: &[hypergate_core::NodeId],
        limit: usize,
    ) -> Vec<Candidate> {
        if context.current_tool.is_none() {
            return self.discover(intent, limit, &SearchFilter::default()).await;
        }
        let mut results = next_step(&self.graph, &self.analytics, context, candidate_pool);
        if results.is_empty() {
            results = self.discover(intent, limit, &SearchFilter::default()).await;
        }
        results.truncate(limit);
        results
    }
}
