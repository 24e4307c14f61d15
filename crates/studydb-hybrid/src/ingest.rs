//! Ingestion stages.
//!
//! A chunk is first persisted in the content store, which makes it "pending":
//! it has an id and is keyword-searchable but has no vector yet. Embedding runs
//! without access to the engine, and the resulting vectors are committed to the
//! vector index in one step. A failure between the stages leaves pending
//! chunks behind, which reconciliation picks up later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use studydb_core::error::Error;
use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_core::types::{ChunkId, NewChunk};
use studydb_core::vector::normalized;

use crate::policy::{embed_with_policy, EmbedPolicy};

/// Chunks persisted in the content store that still need a vector.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    pub ids: Vec<ChunkId>,
    pub texts: Vec<String>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn extend(&mut self, other: PendingBatch) {
        self.ids.extend(other.ids);
        self.texts.extend(other.texts);
    }

    /// Embeds every text in batches of `policy.batch_size`.
    ///
    /// Vectors are checked against the embedder dimension and scaled to unit
    /// length. Any failing batch fails the whole call.
    pub async fn embed(self, embedder: &Arc<dyn Embedder>, policy: &EmbedPolicy) -> Result<EmbeddedBatch> {
        let dim = embedder.dim();
        let mut vectors = Vec::with_capacity(self.texts.len());
        for batch in self.texts.chunks(policy.batch_size.max(1)) {
            let embedded = embed_with_policy(embedder, batch.to_vec(), policy).await?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!("embedder returned {} vectors for {} texts", embedded.len(), batch.len())).into());
            }
            for vector in embedded {
                if vector.len() != dim {
                    return Err(Error::DimensionMismatch { expected: dim, got: vector.len() }.into());
                }
                vectors.push(normalized(vector));
            }
        }
        Ok(EmbeddedBatch { ids: self.ids, vectors })
    }
}

/// Unit-length vectors ready to be added to the vector index.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBatch {
    pub ids: Vec<ChunkId>,
    pub vectors: Vec<Vec<f32>>,
}

/// Outcome of a file ingestion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Ids of every chunk persisted by the call, in ingestion order.
    pub ids: Vec<ChunkId>,
    /// Files that were extracted and chunked.
    pub files: Vec<PathBuf>,
    /// Files that could not be extracted, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One record per chunk, `chunkIndex` following the chunk order.
pub(crate) fn chunk_records(chunks: Vec<String>, base: &ChunkMetadata) -> Vec<NewChunk> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| NewChunk { content, metadata: ChunkMetadata { chunk_index, ..base.clone() } })
        .collect()
}

/// Metadata shared by all chunks of `path`: caller fields plus the file's
/// name, path, size and the ingestion time.
pub(crate) fn file_metadata(path: &Path, base: &ChunkMetadata) -> ChunkMetadata {
    let mut meta = base.clone();
    if meta.filename.is_none() {
        meta.filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
    }
    meta.source_path = Some(path.display().to_string());
    meta.size_bytes = std::fs::metadata(path).ok().map(|m| m.len());
    meta.ingested_at = Some(now_rfc3339());
    meta
}
