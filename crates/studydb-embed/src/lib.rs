//! studydb-embed
//!
//! Embedder implementations: a local XLM-RoBERTa model run with candle and a
//! deterministic hashing embedder for tests and offline use.

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use studydb_core::config::{expand_path, EmbedderKind, EmbeddingSettings};
use studydb_core::error::Error;
use studydb_core::traits::Embedder;

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, XlmRobertaEmbedder};
pub use pool::masked_mean_l2;

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `true`) forces the hashing embedder
/// whatever the configured provider.
pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Builds the configured embedder. A model that cannot be located or loaded
/// is a configuration error.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || settings.provider == EmbedderKind::Hash {
        info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let configured = settings.model_dir.as_deref().map(expand_path);
    let dir = resolve_model_dir(configured.as_deref()).map_err(|e| Error::Configuration(e.to_string()))?;
    let model = XlmRobertaEmbedder::load(&dir, settings.max_len)
        .map_err(|e| Error::Configuration(format!("embedding model in {}: {e:#}", dir.display())))?;
    Ok(Arc::new(model))
}
