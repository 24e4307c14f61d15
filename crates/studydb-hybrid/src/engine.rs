use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use studydb_core::chunker::ChunkingConfig;
use studydb_core::config::Settings;
use studydb_core::error::Error;
use studydb_core::extract::ExtractorRegistry;
use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_core::types::{Chunk, ChunkId, DocumentSummary, HybridHit, SearchHit, SourceKind, SubjectFilter};
use studydb_core::vector::normalized;
use studydb_text::ContentStore;
use studydb_vector::{IndexLoadOutcome, VectorIndex};

use crate::ingest::{chunk_records, file_metadata, now_rfc3339, EmbeddedBatch, IngestReport, PendingBatch};
use crate::merge::fuse;
use crate::policy::{embed_query, EmbedPolicy};

/// Candidates fetched from the vector index per requested result when a
/// subject filter is applied afterwards.
const SUBJECT_OVERFETCH: usize = 10;
/// Lower bound on the filtered candidate pool.
const SUBJECT_MIN_CANDIDATES: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub chunking: ChunkingConfig,
    pub embed: EmbedPolicy,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { chunking: settings.chunking, embed: EmbedPolicy::from_settings(&settings.embedding) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub chunks: u64,
    pub vectors: usize,
    pub pending: usize,
    pub dim: usize,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Pending chunks that received a vector.
    pub embedded: usize,
    /// Vectors dropped because their chunk no longer exists.
    pub orphans_dropped: usize,
}

/// Content store, vector index and embedder behind one retrieval API.
///
/// Writers need `&mut self` and are not internally synchronized: one ingestion,
/// reconciliation, save or load at a time. Use [`crate::SharedEngine`] to share
/// an engine between concurrent callers.
pub struct RetrievalEngine {
    store: ContentStore,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    extractors: ExtractorRegistry,
    options: EngineOptions,
    index_path: PathBuf,
    load_outcome: IndexLoadOutcome,
}

impl RetrievalEngine {
    /// Opens (or creates) the content store in `content_dir` and loads the
    /// vector index snapshot at `index_path`.
    ///
    /// A missing or unusable snapshot yields an empty index; see
    /// [`RetrievalEngine::index_load_outcome`].
    pub fn open(content_dir: &Path, index_path: &Path, embedder: Arc<dyn Embedder>, options: EngineOptions) -> Result<Self> {
        options.chunking.validate()?;
        if options.embed.batch_size == 0 {
            return Err(Error::Configuration("embedding batch size must be positive".into()).into());
        }
        let store = ContentStore::open(content_dir)?;
        let (index, load_outcome) = VectorIndex::load_or_empty(index_path, embedder.dim())?;
        info!(
            chunks = store.len(),
            vectors = index.len(),
            model = embedder.model_id(),
            degraded = load_outcome.is_degraded(),
            "retrieval engine opened"
        );
        Ok(Self {
            store,
            index,
            embedder,
            extractors: ExtractorRegistry::default(),
            options,
            index_path: index_path.to_path_buf(),
            load_outcome,
        })
    }

    pub fn open_with_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        Self::open(
            &settings.storage.content_dir(),
            &settings.storage.index_path(),
            embedder,
            EngineOptions::from_settings(settings),
        )
    }

    /// Replaces the default (plain text) extractors.
    #[must_use]
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// How the vector index was obtained by the last open or load.
    pub fn index_load_outcome(&self) -> &IndexLoadOutcome {
        &self.load_outcome
    }

    // ---- ingestion ----

    /// Chunks `text`, embeds the chunks and indexes them. Returns the chunk
    /// ids in text order.
    pub async fn add_text(&mut self, text: &str, metadata: ChunkMetadata) -> Result<Vec<ChunkId>> {
        let pending = self.stage_text(text, metadata)?;
        let ids = pending.ids.clone();
        let embedded = pending.embed(&self.embedder, &self.options.embed).await?;
        self.commit(embedded)?;
        Ok(ids)
    }

    /// Extracts, chunks, embeds and indexes every file in `paths`. Files that
    /// cannot be extracted are skipped and listed in the report.
    pub async fn add_files(&mut self, paths: &[PathBuf], metadata: ChunkMetadata) -> Result<IngestReport> {
        let (pending, report) = self.stage_files(paths, &metadata)?;
        let embedded = pending.embed(&self.embedder, &self.options.embed).await?;
        self.commit(embedded)?;
        Ok(report)
    }

    /// Persists the chunks of `text` without embedding them.
    pub fn stage_text(&mut self, text: &str, mut metadata: ChunkMetadata) -> Result<PendingBatch> {
        let chunks = self.options.chunking.chunk(text)?;
        if chunks.is_empty() {
            debug!("empty text; nothing to ingest");
            return Ok(PendingBatch::default());
        }
        if metadata.ingested_at.is_none() {
            metadata.ingested_at = Some(now_rfc3339());
        }
        let records = chunk_records(chunks, &metadata);
        let texts = records.iter().map(|r| r.content.clone()).collect();
        let ids = self.store.add_many(&records)?;
        info!(chunks = ids.len(), "text staged");
        Ok(PendingBatch { ids, texts })
    }

    /// Persists the chunks of every extractable file without embedding them.
    pub fn stage_files(&mut self, paths: &[PathBuf], metadata: &ChunkMetadata) -> Result<(PendingBatch, IngestReport)> {
        let mut pending = PendingBatch::default();
        let mut report = IngestReport::default();
        for path in paths {
            let text = match self.extractors.extract(path) {
                Ok(text) => text,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping file");
                    report.skipped.push((path.clone(), format!("{err:#}")));
                    continue;
                }
            };
            let chunks = self.options.chunking.chunk(&text)?;
            let records = chunk_records(chunks, &file_metadata(path, metadata));
            let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
            let ids = self.store.add_many(&records)?;
            debug!(path = %path.display(), chunks = ids.len(), "file staged");
            report.ids.extend_from_slice(&ids);
            report.files.push(path.clone());
            pending.extend(PendingBatch { ids, texts });
        }
        info!(
            files = report.files.len(),
            skipped = report.skipped.len(),
            chunks = report.ids.len(),
            "files staged"
        );
        Ok((pending, report))
    }

    /// Adds embedded chunks to the vector index and writes the snapshot.
    pub fn commit(&mut self, batch: EmbeddedBatch) -> Result<()> {
        let ids = batch.ids.iter().map(|id| to_vector_id(*id)).collect::<Result<Vec<_>>>()?;
        self.index.add(&batch.vectors, &ids)?;
        self.save()?;
        info!(vectors = ids.len(), total = self.index.len(), "ingestion committed");
        Ok(())
    }

    // ---- search ----

    /// Chunks nearest to `query` by cosine similarity, best first.
    ///
    /// With a subject filter, `max(k * 10, 100)` candidates are fetched and
    /// filtered case-insensitively before truncating to `k`. Never fetches more
    /// candidates than the index holds.
    pub async fn search_similarity(&self, query: &str, k: usize, subject: Option<&str>) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(&self.embedder, query, &self.options.embed).await?;
        self.search_by_vector(&vector, k, subject)
    }

    /// Similarity search with an already computed query vector.
    pub fn search_by_vector(&self, query: &[f32], k: usize, subject: Option<&str>) -> Result<Vec<SearchHit>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let filter = SubjectFilter::new(subject);
        let wanted = if filter.is_some() { k.saturating_mul(SUBJECT_OVERFETCH).max(SUBJECT_MIN_CANDIDATES) } else { k };
        let fetch = wanted.min(self.index.len());
        let query = normalized(query.to_vec());
        let neighbors = self.index.search_one(&query, fetch)?;
        let mut hits = Vec::with_capacity(k.min(fetch));
        for (id, score) in neighbors.hits() {
            let Ok(chunk_id) = ChunkId::try_from(id) else { continue };
            let Some(chunk) = self.store.get(chunk_id)? else {
                debug!(id, "vector without chunk; skipped");
                continue;
            };
            if filter.as_ref().is_some_and(|f| !f.matches(&chunk.metadata)) {
                continue;
            }
            hits.push(SearchHit { chunk, score, source: SourceKind::Vector });
            if hits.len() >= k {
                break;
            }
        }
        Ok(hits)
    }

    /// Full-text search over content and metadata, best match first.
    pub fn search_keyword(&self, query: &str, k: usize, subject: Option<&str>) -> Result<Vec<Chunk>> {
        self.store.search_keyword(query, k, subject)
    }

    /// Runs similarity and keyword search for `k` results each and merges them
    /// with weight `alpha` on the similarity score.
    pub async fn hybrid_search(&self, query: &str, k: usize, alpha: f32, subject: Option<&str>) -> Result<Vec<HybridHit>> {
        check_alpha(alpha)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(&self.embedder, query, &self.options.embed).await?;
        self.hybrid_with_vector(query, &vector, k, alpha, subject)
    }

    pub fn hybrid_with_vector(&self, query: &str, vector: &[f32], k: usize, alpha: f32, subject: Option<&str>) -> Result<Vec<HybridHit>> {
        check_alpha(alpha)?;
        let semantic = self.search_by_vector(vector, k, subject)?;
        let keyword = self.search_keyword(query, k, subject)?;
        Ok(fuse(semantic, keyword, alpha, k))
    }

    // ---- lookup ----

    pub fn get(&self, id: ChunkId) -> Result<Option<Chunk>> {
        self.store.get(id)
    }

    pub fn list_documents(&self, subject: Option<&str>) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents(subject)
    }

    pub fn list_subjects(&self) -> Result<Vec<String>> {
        self.store.list_subjects()
    }

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            chunks: self.store.len(),
            vectors: self.index.len(),
            pending: self.pending_ids()?.len(),
            dim: self.index.dim(),
            model: self.embedder.model_id().to_string(),
        })
    }

    // ---- consistency ----

    /// Chunks present in the content store without a vector, ascending.
    pub fn pending_ids(&self) -> Result<Vec<ChunkId>> {
        Ok(self
            .store
            .ids()?
            .into_iter()
            .filter(|id| i64::try_from(*id).map_or(true, |v| !self.index.contains(v)))
            .collect())
    }

    /// Vector ids with no chunk in the content store.
    pub fn orphan_ids(&self) -> Result<Vec<i64>> {
        let known: HashSet<ChunkId> = self.store.ids()?.into_iter().collect();
        Ok(self
            .index
            .ids()
            .iter()
            .copied()
            .filter(|id| ChunkId::try_from(*id).map_or(true, |c| !known.contains(&c)))
            .collect())
    }

    /// Pending chunks with their content, ready to embed.
    pub fn stage_pending(&self) -> Result<PendingBatch> {
        let missing: HashSet<ChunkId> = self.pending_ids()?.into_iter().collect();
        let mut batch = PendingBatch::default();
        for chunk in self.store.all_chunks()? {
            if missing.contains(&chunk.id) {
                batch.ids.push(chunk.id);
                batch.texts.push(chunk.content);
            }
        }
        Ok(batch)
    }

    /// Drops orphan vectors, adds the re-embedded pending chunks and saves.
    pub fn finish_reconcile(&mut self, embedded: EmbeddedBatch) -> Result<ReconcileReport> {
        let known: HashSet<ChunkId> = self.store.ids()?.into_iter().collect();
        let orphans_dropped = self.index.retain(|id| ChunkId::try_from(id).is_ok_and(|c| known.contains(&c)));
        let embedded_count = embedded.ids.len();
        self.commit(embedded)?;
        let report = ReconcileReport { embedded: embedded_count, orphans_dropped };
        info!(embedded = report.embedded, orphans_dropped = report.orphans_dropped, "reconciliation finished");
        Ok(report)
    }

    /// Gives every pending chunk a vector and removes orphan vectors.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let pending = self.stage_pending()?;
        if !pending.is_empty() {
            info!(pending = pending.len(), "re-embedding pending chunks");
        }
        let embedded = pending.embed(&self.embedder, &self.options.embed).await?;
        self.finish_reconcile(embedded)
    }

    // ---- persistence ----

    /// Writes the vector index snapshot.
    pub fn save(&self) -> Result<()> {
        self.index.save(&self.index_path)
    }

    /// Replaces the in-memory vector index with the snapshot on disk, falling
    /// back to an empty index.
    pub fn load(&mut self) -> Result<IndexLoadOutcome> {
        let (index, outcome) = VectorIndex::load_or_empty(&self.index_path, self.embedder.dim())?;
        self.index = index;
        self.load_outcome = outcome.clone();
        Ok(outcome)
    }
}

fn to_vector_id(id: ChunkId) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::InvalidArgument(format!("chunk id {id} exceeds the vector id range")).into())
}

fn check_alpha(alpha: f32) -> Result<()> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("alpha must be within [0, 1], got {alpha}")).into())
    }
}
