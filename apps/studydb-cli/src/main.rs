//! studydb - ingest study material and query it by similarity, keyword or both.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use studydb_core::config::{Config, EmbedderKind, Settings};
use studydb_core::extract::collect_files;
use studydb_core::metadata::ChunkMetadata;
use studydb_core::traits::Embedder;
use studydb_embed::build_embedder;
use studydb_hybrid::{RetrievalEngine, SharedEngine};

use crate::cli::{Cli, Commands, MetaArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }
    let filter = match cli.verbose {
        0 => "warn,studydb=info",
        1 => "info,studydb=debug",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Config::load()?.settings()?;
    if let Some(dir) = &cli.data_dir {
        settings.storage.data_dir = dir.display().to_string();
    }
    if cli.fake_embeddings {
        settings.embedding.provider = EmbedderKind::Hash;
    }
    Ok(settings)
}

/// Composition root: settings, embedder and engine are built here and handed
/// to the command.
async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    let settings = load_settings(&cli)?;
    let embedder: Arc<dyn Embedder> = build_embedder(&settings.embedding)?;
    let engine = RetrievalEngine::open_with_settings(&settings, embedder)?;
    if engine.index_load_outcome().is_degraded() {
        eprintln!("warning: the vector index could not be loaded and was reset; run `studydb reconcile`");
    }
    let engine = SharedEngine::new(engine);
    if settings.reconcile_on_open {
        let report = with_spinner(quiet, "reconciling", engine.reconcile()).await?;
        info!(embedded = report.embedded, "reconciled on open");
    }

    let k_default = settings.search.default_k;
    match cli.command {
        Commands::Add { paths, meta } => {
            let files = collect_files(&paths);
            let metadata = metadata_from(&meta)?;
            let report = with_spinner(quiet, &format!("ingesting {} files", files.len()), engine.add_files(&files, metadata)).await?;
            print_json(&report)
        }
        Commands::AddText { text, meta } => {
            let metadata = metadata_from(&meta)?;
            let ids = with_spinner(quiet, "ingesting text", engine.add_text(&text, metadata)).await?;
            print_json(&ids)
        }
        Commands::Search(q) => {
            let hits = engine.search_similarity(&q.query, q.k.unwrap_or(k_default), q.subject.as_deref()).await?;
            print_json(&hits)
        }
        Commands::Keyword(q) => {
            let chunks = engine.search_keyword(&q.query, q.k.unwrap_or(k_default), q.subject.as_deref()).await?;
            print_json(&chunks)
        }
        Commands::Hybrid { query: q, alpha } => {
            let alpha = alpha.unwrap_or(settings.search.default_alpha);
            let hits = engine.hybrid_search(&q.query, q.k.unwrap_or(k_default), alpha, q.subject.as_deref()).await?;
            print_json(&hits)
        }
        Commands::Documents { subject } => print_json(&engine.list_documents(subject.as_deref()).await?),
        Commands::Subjects => print_json(&engine.list_subjects().await?),
        Commands::Get { id } => match engine.get(id).await? {
            Some(chunk) => print_json(&chunk),
            None => Err(studydb_core::error::Error::NotFound(format!("chunk {id}")).into()),
        },
        Commands::Reconcile => {
            let report = with_spinner(quiet, "reconciling", engine.reconcile()).await?;
            print_json(&report)
        }
        Commands::Stats => print_json(&engine.stats().await?),
    }
}

fn metadata_from(args: &MetaArgs) -> Result<ChunkMetadata> {
    let mut metadata = match &args.meta {
        Some(raw) => ChunkMetadata::from_value(serde_json::from_str(raw).context("--meta must be valid JSON")?),
        None => ChunkMetadata::default(),
    };
    if let Some(subject) = &args.subject {
        metadata.subject = Some(subject.clone());
    }
    if let Some(title) = &args.title {
        metadata.title = Some(title.clone());
    }
    Ok(metadata)
}

async fn with_spinner<T>(quiet: bool, message: &str, work: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    if quiet {
        return work.await;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    let result = work.await;
    pb.finish_and_clear();
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
