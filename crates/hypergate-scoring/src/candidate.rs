use chrono::{DateTime, Utc};
use hypergate_core::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    Tool,
    Capability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: NodeId,
    pub kind: CandidateKind,
    pub name: String,
    pub description: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Deterministic ranking: score descending, ties broken by newer
/// `updated_at`, then lexicographically by id.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
}

/// Drops non-finite scores rather than clamping them.
pub fn discard_non_finite(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.into_iter().filter(|c| c.score.is_finite()).collect()
}
