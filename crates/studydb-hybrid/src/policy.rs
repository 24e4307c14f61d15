//! Timeout and retry policy for embedder calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use studydb_core::config::EmbeddingSettings;
use studydb_core::error::Error;
use studydb_core::traits::Embedder;
use studydb_core::vector::normalized;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedPolicy {
    /// Texts per embedder call.
    pub batch_size: usize,
    /// Limit for a single embedder call.
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for EmbedPolicy {
    fn default() -> Self {
        Self::from_settings(&EmbeddingSettings::default())
    }
}

impl EmbedPolicy {
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Runs one embedder call on the blocking pool, bounded by `policy.timeout`
/// and retried up to `policy.max_retries` times.
///
/// A call that times out keeps running on its blocking thread; its result is
/// discarded.
pub async fn embed_with_policy(embedder: &Arc<dyn Embedder>, texts: Vec<String>, policy: &EmbedPolicy) -> Result<Vec<Vec<f32>>> {
    let texts = Arc::new(texts);
    let mut attempt = 0u32;
    loop {
        let call_embedder = Arc::clone(embedder);
        let call_texts = Arc::clone(&texts);
        let call = tokio::task::spawn_blocking(move || call_embedder.embed_batch(&call_texts));
        let failure = match tokio::time::timeout(policy.timeout, call).await {
            Ok(Ok(Ok(vectors))) => return Ok(vectors),
            Ok(Ok(Err(err))) => Error::Embedding(format!("{err:#}")),
            Ok(Err(join)) => Error::Embedding(format!("embedder task failed: {join}")),
            Err(_) => Error::EmbeddingTimeout(policy.timeout),
        };
        if attempt >= policy.max_retries {
            return Err(failure.into());
        }
        attempt += 1;
        warn!(attempt, max_retries = policy.max_retries, texts = texts.len(), error = %failure, "embedding failed; retrying");
        tokio::time::sleep(policy.backoff * attempt).await;
    }
}

/// Embeds a search query and scales it to unit length.
pub async fn embed_query(embedder: &Arc<dyn Embedder>, query: &str, policy: &EmbedPolicy) -> Result<Vec<f32>> {
    let mut vectors = embed_with_policy(embedder, vec![query.to_string()], policy).await?;
    let vector = vectors
        .pop()
        .ok_or_else(|| Error::Embedding("embedder returned no vector for the query".into()))?;
    if vector.len() != embedder.dim() {
        return Err(Error::DimensionMismatch { expected: embedder.dim(), got: vector.len() }.into());
    }
    Ok(normalized(vector))
}
