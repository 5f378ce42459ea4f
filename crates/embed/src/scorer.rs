use anyhow::Result;

use queryfit_core::cosine_similarity;

use crate::client::EmbeddingClient;

/// Semantic-similarity primitive shared by the whole pipeline: cosine of
/// two sentence embeddings, in [-1, 1]. Deterministic for a fixed backend
/// and identical inputs.
#[derive(Clone)]
pub struct SimilarityScorer {
    client: EmbeddingClient,
}

impl SimilarityScorer {
    pub fn new(client: EmbeddingClient) -> Self {
        Self { client }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(EmbeddingClient::from_env()?))
    }

    /// Returns 0.0 when either span is empty without touching the backend.
    pub fn score(&self, a: &str, b: &str) -> Result<f32> {
        if a.trim().is_empty() || b.trim().is_empty() {
            return Ok(0.0);
        }
        let va = self.client.embed(a)?;
        let vb = self.client.embed(b)?;
        Ok(cosine_similarity(&va, &vb))
    }
}
