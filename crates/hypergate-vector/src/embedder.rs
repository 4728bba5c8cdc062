//! Text -> embedding encoding. The embedding model is an opaque
//! collaborator; `LocalEmbedder` is the default, dependency-free
//! implementation, built on a pluggable `Embedder` trait so a real
//! model-backed provider can be swapped in later without pulling in an ML
//! runtime.

use async_trait::async_trait;

pub const EMBEDDING_DIM: usize = 256;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, text: &str) -> Vec<f32>;
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// A deterministic, offline embedder: hashes character trigrams into a
/// fixed-width vector (a feature-hashing / "hashing trick" bag-of-trigrams),
/// then L2-normalises. Gives semantically-nonsensical-but-stable vectors
/// good enough to exercise cosine similarity, ranking and the SHGAT message
/// pass without a network call.
pub struct LocalEmbedder {
    dimension: usize,
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }
}

impl LocalEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn trigrams(text: &str) -> Vec<String> {
        let normalized: String = text.to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < 3 {
            return vec![normalized];
        }
        chars
            .windows(3)
            .map(|w| w.iter().collect::<String>())
            .collect()
    }

    fn hash_bucket(&self, s: &str) -> usize {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        s.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn encode(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimension];
        for gram in Self::trigrams(text) {
            let bucket = self.hash_bucket(&gram);
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity in `[-1, 1]`; callers clamp to the visible
/// `[0, 0.95]` range separately.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_has_similarity_one() {
        let embedder = LocalEmbedder::default();
        let a = embedder.encode("read the file and post it").await;
        let b = embedder.encode("read the file and post it").await;
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn unrelated_text_has_lower_similarity() {
        let embedder = LocalEmbedder::default();
        let a = embedder.encode("read a file from disk").await;
        let b = embedder.encode("launch a rocket to orbit").await;
        let c = embedder.encode("read a text file from storage").await;
        assert!(cosine_similarity(&a, &c) > cosine_similarity(&a, &b));
    }
}
