//! Domain types shared by the content store, the vector index and the engine.

use serde::{Deserialize, Serialize};

use crate::metadata::ChunkMetadata;

/// Identifier assigned by the content store. Strictly increasing, never reused.
pub type ChunkId = u64;

/// The atomic retrievable unit: a window of a source text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Indicates which signal produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Text,
}

/// A scored result from a single engine. Higher `score` is always better.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}

/// A result of the weighted semantic + keyword merge.
///
/// `semantic` is the cosine similarity (0 when the chunk only matched by
/// keyword) and `keyword` is the rank-derived score `1 / (1 + rank)` (0 when
/// the chunk only matched by similarity).
#[derive(Debug, Clone, Serialize)]
pub struct HybridHit {
    pub chunk: Chunk,
    pub score: f32,
    pub semantic: f32,
    pub keyword: f32,
}

/// One entry per logical document (chunks grouped by `sourcePath`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    /// Id of the first chunk seen for this document.
    pub id: ChunkId,
    pub filename: String,
    pub subject: String,
    pub file_type: String,
    pub size_bytes: Option<u64>,
    pub ingested_at: Option<String>,
    pub metadata: ChunkMetadata,
}

/// Case-insensitive equality filter on `metadata.subject`.
///
/// An empty filter string means "no filter".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFilter(String);

impl SubjectFilter {
    pub fn new(subject: Option<&str>) -> Option<Self> {
        subject
            .filter(|s| !s.is_empty())
            .map(|s| Self(s.to_lowercase()))
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.subject.as_deref().unwrap_or("").to_lowercase() == self.0
    }
}
