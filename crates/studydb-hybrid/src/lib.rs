//! studydb-hybrid
//!
//! The retrieval engine: staged ingestion into the content store and the
//! vector index, similarity / keyword / hybrid search, reconciliation of
//! chunks still waiting for a vector, and a lock-aware wrapper for sharing one
//! engine between concurrent request handlers.

pub mod engine;
pub mod ingest;
pub mod merge;
pub mod policy;
pub mod shared;

pub use engine::{EngineOptions, EngineStats, ReconcileReport, RetrievalEngine};
pub use ingest::{EmbeddedBatch, IngestReport, PendingBatch};
pub use policy::EmbedPolicy;
pub use shared::SharedEngine;
pub use studydb_vector::IndexLoadOutcome;
