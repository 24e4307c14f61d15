use std::path::Path;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic per (text, model) pair. Calls may
/// block for a long time (model inference, network), so the engine runs them
/// on the blocking pool under a timeout.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Stable identifier of the model, e.g. `hash:d384`.
    fn model_id(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Produces raw text from a file of a supported format.
pub trait Extractor: Send + Sync {
    /// Lowercase file extensions (without the dot) this extractor accepts.
    fn extensions(&self) -> &[&str];
    fn extract(&self, path: &Path) -> anyhow::Result<String>;
}
