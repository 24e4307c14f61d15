mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{fast_policy, open_with, options, FlakyEmbedder, NarrowEmbedder, SlowEmbedder};
use studydb_core::error::Error;
use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_hybrid::policy::embed_with_policy;
use studydb_hybrid::EmbedPolicy;

#[tokio::test]
async fn failed_embedding_leaves_chunks_pending_until_reconciled() {
    let tmp = TempDir::new().expect("tmp");
    let flaky = Arc::new(FlakyEmbedder::new());
    let mut engine = open_with(tmp.path(), flaky.clone(), options(1000, 100));
    engine.add_text("Volcanoes erupt molten rock.", ChunkMetadata::default()).await.expect("ingest");

    flaky.failing.store(true, Ordering::SeqCst);
    let err = engine
        .add_text("Earthquakes release stored strain energy.", ChunkMetadata::default())
        .await
        .expect_err("embedding must fail");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Embedding(_))));

    let pending = engine.pending_ids().expect("pending");
    assert_eq!(pending.len(), 1);
    let stuck = engine.get(pending[0]).expect("get").expect("chunk persisted");
    assert!(stuck.content.starts_with("Earthquakes"));
    assert_eq!(engine.search_keyword("earthquakes", 5, None).expect("keyword").len(), 1);
    assert_eq!(engine.stats().expect("stats").pending, 1);

    flaky.failing.store(false, Ordering::SeqCst);
    let report = engine.reconcile().await.expect("reconcile");
    assert_eq!(report.embedded, 1);
    assert_eq!(report.orphans_dropped, 0);
    assert!(engine.pending_ids().expect("pending").is_empty());
    let hits = engine.search_similarity("earthquakes strain energy", 1, None).await.expect("search");
    assert_eq!(hits[0].chunk.id, pending[0]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let flaky = Arc::new(FlakyEmbedder::new());
    flaky.fail_first.store(2, Ordering::SeqCst);
    let embedder: Arc<dyn Embedder> = flaky.clone();
    let policy = EmbedPolicy { max_retries: 2, backoff: Duration::from_millis(1), ..fast_policy() };

    let vectors = embed_with_policy(&embedder, vec!["retry me".to_string()], &policy).await.expect("third attempt succeeds");
    assert_eq!(vectors.len(), 1);
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let flaky = Arc::new(FlakyEmbedder::new());
    flaky.failing.store(true, Ordering::SeqCst);
    let embedder: Arc<dyn Embedder> = flaky.clone();
    let policy = EmbedPolicy { max_retries: 1, ..fast_policy() };

    let err = embed_with_policy(&embedder, vec!["never".to_string()], &policy).await.expect_err("always fails");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Embedding(_))));
    assert_eq!(flaky.calls(), 2);
}

#[tokio::test]
async fn slow_embedder_times_out() {
    let slow = Arc::new(SlowEmbedder { delay: Duration::from_millis(300), calls: AtomicUsize::new(0) });
    let embedder: Arc<dyn Embedder> = slow.clone();
    let policy = EmbedPolicy { timeout: Duration::from_millis(20), max_retries: 1, ..fast_policy() };

    let err = embed_with_policy(&embedder, vec!["slow".to_string()], &policy).await.expect_err("timeout");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmbeddingTimeout(d)) if *d == Duration::from_millis(20)));
    assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ingestion_embeds_in_bounded_batches() {
    let tmp = TempDir::new().expect("tmp");
    let flaky = Arc::new(FlakyEmbedder::new());
    let mut opts = options(20, 5);
    opts.embed.batch_size = 2;
    let mut engine = open_with(tmp.path(), flaky.clone(), opts);

    let text = "a".repeat(95);
    let ids = engine.add_text(&text, ChunkMetadata::default()).await.expect("ingest");
    assert_eq!(ids.len(), 6);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(flaky.largest_batch.load(Ordering::SeqCst), 2);
    assert_eq!(engine.stats().expect("stats").vectors, 6);
}

#[tokio::test]
async fn wrong_vector_width_is_rejected_and_nothing_is_indexed() {
    let tmp = TempDir::new().expect("tmp");
    let mut engine = open_with(tmp.path(), Arc::new(NarrowEmbedder), options(1000, 100));
    let err = engine.add_text("narrow vectors", ChunkMetadata::default()).await.expect_err("mismatch");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DimensionMismatch { .. })));
    assert_eq!(engine.stats().expect("stats").vectors, 0);
    assert_eq!(engine.pending_ids().expect("pending").len(), 1);
}
