mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tempfile::TempDir;

use common::{open, open_with, options, subject, FlakyEmbedder};
use studydb_core::metadata::ChunkMetadata;
use studydb_hybrid::{IndexLoadOutcome, SharedEngine};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestion_is_serialized_and_complete() {
    let tmp = TempDir::new().expect("tmp");
    let shared = SharedEngine::new(open(tmp.path()));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = shared.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .add_text(&format!("lecture {i} about thermodynamics and entropy"), subject("Physics"))
                .await
        }));
    }
    let mut ids = HashSet::new();
    for task in tasks {
        for id in task.await.expect("join").expect("ingest") {
            assert!(ids.insert(id), "id {id} issued twice");
        }
    }
    assert_eq!(ids.len(), 8);

    let stats = shared.stats().await.expect("stats");
    assert_eq!((stats.chunks, stats.vectors, stats.pending), (8, 8, 0));

    shared.save().await.expect("save");
    assert_eq!(shared.load().await.expect("load"), IndexLoadOutcome::Loaded { vectors: 8 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn searches_run_alongside_ingestion() {
    let tmp = TempDir::new().expect("tmp");
    let shared = SharedEngine::new(open(tmp.path()));
    shared.add_text("Newton's laws describe motion.", subject("Physics")).await.expect("seed");

    let writer = {
        let engine = shared.clone();
        tokio::spawn(async move {
            for i in 0..5 {
                engine.add_text(&format!("momentum is conserved {i}"), subject("Physics")).await.expect("ingest");
            }
        })
    };
    for _ in 0..5 {
        let hits = shared.search_similarity("newton laws motion", 1, Some("physics")).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.content.starts_with("Newton"));
        assert!(!shared.search_keyword("newton", 3, None).await.expect("keyword").is_empty());
    }
    writer.await.expect("writer");

    assert_eq!(shared.list_documents(Some("physics")).await.expect("documents").len(), 1);
    assert_eq!(shared.list_subjects().await.expect("subjects"), vec!["Physics"]);
    let hybrid = shared.hybrid_search("momentum", 3, 0.5, None).await.expect("hybrid");
    assert_eq!(hybrid.len(), 3);
    assert!(shared.get(hybrid[0].chunk.id).await.expect("get").is_some());
}

#[tokio::test]
async fn shared_reconcile_recovers_failed_ingestion() {
    let tmp = TempDir::new().expect("tmp");
    let flaky = Arc::new(FlakyEmbedder::new());
    let shared = SharedEngine::new(open_with(tmp.path(), flaky.clone(), options(1000, 100)));

    flaky.failing.store(true, Ordering::SeqCst);
    assert!(shared.add_text("Osmosis moves water across membranes.", ChunkMetadata::default()).await.is_err());
    assert_eq!(shared.read().await.pending_ids().expect("pending").len(), 1);

    flaky.failing.store(false, Ordering::SeqCst);
    let report = shared.reconcile().await.expect("reconcile");
    assert_eq!(report.embedded, 1);
    assert_eq!(shared.search_similarity("osmosis water", 1, None).await.expect("search").len(), 1);
}
