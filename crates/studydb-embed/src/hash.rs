use std::hash::Hasher;

use anyhow::Result;
use twox_hash::XxHash64;

use studydb_core::traits::Embedder;
use studydb_core::vector::normalize;

/// Deterministic bag-of-words embedder.
///
/// Every lowercase alphanumeric token is hashed into one of `dim` buckets with
/// a positive weight, then the vector is scaled to unit length. Texts sharing
/// tokens get a positive cosine similarity; text without tokens maps to the
/// zero vector. Needs no model files, so it backs tests and offline setups.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, model_id: format!("hash:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 {
            return v;
        }
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let frac = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += 0.5 + frac / 2.0;
        }
        normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
