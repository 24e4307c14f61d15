use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Vector index could not be loaded: {0}")]
    IndexLoad(String),

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Id {0} is already present in the vector index")]
    DuplicateId(i64),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding call timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
