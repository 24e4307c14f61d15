//! studydb-core
//!
//! Shared domain types, the chunk metadata record, chunking, vector
//! normalization, the error taxonomy, configuration, and the collaborator
//! traits (`Embedder`, `Extractor`) used by the text, vector, and hybrid crates.

pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod traits;
pub mod types;
pub mod vector;
