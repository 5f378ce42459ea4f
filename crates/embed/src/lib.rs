pub mod client;
pub mod scorer;

pub use client::{EmbeddingBackend, EmbeddingClient};
pub use scorer::SimilarityScorer;
