pub mod embedding;
pub mod error;
pub mod normalization;
pub mod schema;
pub mod score;

pub use embedding::{cosine_similarity, HashEmbedder, HashEmbedderConfig};
pub use error::{RefineError, Result};
pub use schema::{require_column, resolve_column};
pub use score::{parse_score, round_to};
