use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefineError {
    #[error("failed to ingest {path:?}: {reason}")]
    Ingestion { path: PathBuf, reason: String },
    #[error("missing mandatory column: {field}")]
    Schema { field: &'static str },
    #[error("generation response not parseable: {0}")]
    GenerationParse(String),
    #[error("generation service error: {0}")]
    Service(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl RefineError {
    /// Errors that abort a whole run. Everything else is consumed as a
    /// failed attempt inside the refinement loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RefineError::Ingestion { .. } | RefineError::Schema { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RefineError>;
