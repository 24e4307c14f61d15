#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use studydb_core::chunker::ChunkingConfig;
use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_embed::HashEmbedder;
use studydb_hybrid::{EmbedPolicy, EngineOptions, RetrievalEngine};

pub const DIM: usize = 256;

pub fn fast_policy() -> EmbedPolicy {
    EmbedPolicy { batch_size: 16, timeout: Duration::from_secs(10), max_retries: 0, backoff: Duration::ZERO }
}

pub fn options(size: usize, overlap: usize) -> EngineOptions {
    EngineOptions { chunking: ChunkingConfig { size, overlap }, embed: fast_policy() }
}

pub fn open_with(dir: &Path, embedder: Arc<dyn Embedder>, options: EngineOptions) -> RetrievalEngine {
    RetrievalEngine::open(&dir.join("content"), &dir.join("vectors.arrow"), embedder, options).expect("open engine")
}

pub fn open(dir: &Path) -> RetrievalEngine {
    open_with(dir, Arc::new(HashEmbedder::new(DIM)), options(1000, 100))
}

pub fn subject(s: &str) -> ChunkMetadata {
    ChunkMetadata { subject: Some(s.to_string()), ..Default::default() }
}

/// Hash embeddings, except that calls fail while `failing` is set.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    pub failing: AtomicBool,
    /// Number of leading calls that fail regardless of `failing`.
    pub fail_first: AtomicUsize,
    pub calls: AtomicUsize,
    pub largest_batch: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(DIM),
            failing: AtomicBool::new(false),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            largest_batch: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FlakyEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn model_id(&self) -> &str {
        "flaky"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(texts.len(), Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) || self.failing.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        self.inner.embed_batch(texts)
    }
}

/// Sleeps before answering.
pub struct SlowEmbedder {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl Embedder for SlowEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn model_id(&self) -> &str {
        "slow"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        HashEmbedder::new(DIM).embed_batch(texts)
    }
}

/// Returns vectors of the wrong width.
pub struct NarrowEmbedder;

impl Embedder for NarrowEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn model_id(&self) -> &str {
        "narrow"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; DIM / 2]).collect())
    }
}
