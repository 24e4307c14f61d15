//! studydb-vector
//!
//! Exact inner-product index over unit-normalized chunk embeddings, persisted
//! as a single Arrow IPC snapshot that is rewritten atomically on every save.

pub mod index;
pub mod schema;

pub use index::{IndexLoadOutcome, Neighbors, VectorIndex, NO_MATCH};
