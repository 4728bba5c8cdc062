//! Vector Index: `encode`/`searchTools`/
//! `searchCapabilities` over tool and capability descriptions.

pub mod embedder;
pub mod index;

pub use embedder::{cosine_similarity, Embedder, LocalEmbedder, EMBEDDING_DIM};
pub use index::{IndexKind, VectorIndex, SCORE_CAP};
