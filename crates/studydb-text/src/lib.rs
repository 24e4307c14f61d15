//! studydb-text
//!
//! Tantivy-backed content store: the chunk records (id, content, metadata) and
//! the full-text index over them live in one index and are committed together.

pub mod schema;
pub mod store;

pub use store::ContentStore;
