use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_core::types::{Chunk, ChunkId, DocumentSummary, HybridHit, SearchHit};
use studydb_vector::IndexLoadOutcome;

use crate::engine::{EngineStats, ReconcileReport, RetrievalEngine};
use crate::ingest::IngestReport;
use crate::policy::{embed_query, EmbedPolicy};

/// A [`RetrievalEngine`] shared between concurrent callers.
///
/// Searches run concurrently under a read lock. Ingestion, reconciliation,
/// save and load are serialized by a separate writer mutex; the engine itself
/// is only write-locked to persist chunks and to commit vectors, never while
/// the embedder runs.
#[derive(Clone)]
pub struct SharedEngine {
    engine: Arc<RwLock<RetrievalEngine>>,
    writer: Arc<Mutex<()>>,
    embedder: Arc<dyn Embedder>,
    policy: EmbedPolicy,
}

impl SharedEngine {
    pub fn new(engine: RetrievalEngine) -> Self {
        let embedder = Arc::clone(engine.embedder());
        let policy = engine.options().embed.clone();
        Self { engine: Arc::new(RwLock::new(engine)), writer: Arc::new(Mutex::new(())), embedder, policy }
    }

    /// Read access for operations not mirrored here.
    pub async fn read(&self) -> RwLockReadGuard<'_, RetrievalEngine> {
        self.engine.read().await
    }

    pub async fn add_text(&self, text: &str, metadata: ChunkMetadata) -> Result<Vec<ChunkId>> {
        let _writer = self.writer.lock().await;
        let pending = self.engine.write().await.stage_text(text, metadata)?;
        let ids = pending.ids.clone();
        let embedded = pending.embed(&self.embedder, &self.policy).await?;
        self.engine.write().await.commit(embedded)?;
        Ok(ids)
    }

    pub async fn add_files(&self, paths: &[PathBuf], metadata: ChunkMetadata) -> Result<IngestReport> {
        let _writer = self.writer.lock().await;
        let (pending, report) = self.engine.write().await.stage_files(paths, &metadata)?;
        let embedded = pending.embed(&self.embedder, &self.policy).await?;
        self.engine.write().await.commit(embedded)?;
        Ok(report)
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _writer = self.writer.lock().await;
        let pending = self.engine.read().await.stage_pending()?;
        let embedded = pending.embed(&self.embedder, &self.policy).await?;
        self.engine.write().await.finish_reconcile(embedded)
    }

    pub async fn search_similarity(&self, query: &str, k: usize, subject: Option<&str>) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(&self.embedder, query, &self.policy).await?;
        self.engine.read().await.search_by_vector(&vector, k, subject)
    }

    pub async fn search_keyword(&self, query: &str, k: usize, subject: Option<&str>) -> Result<Vec<Chunk>> {
        self.engine.read().await.search_keyword(query, k, subject)
    }

    pub async fn hybrid_search(&self, query: &str, k: usize, alpha: f32, subject: Option<&str>) -> Result<Vec<HybridHit>> {
        let vector = embed_query(&self.embedder, query, &self.policy).await?;
        self.engine.read().await.hybrid_with_vector(query, &vector, k, alpha, subject)
    }

    pub async fn get(&self, id: ChunkId) -> Result<Option<Chunk>> {
        self.engine.read().await.get(id)
    }

    pub async fn list_documents(&self, subject: Option<&str>) -> Result<Vec<DocumentSummary>> {
        self.engine.read().await.list_documents(subject)
    }

    pub async fn list_subjects(&self) -> Result<Vec<String>> {
        self.engine.read().await.list_subjects()
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.engine.read().await.stats()
    }

    pub async fn save(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.engine.read().await.save()
    }

    pub async fn load(&self) -> Result<IndexLoadOutcome> {
        let _writer = self.writer.lock().await;
        self.engine.write().await.load()
    }
}
