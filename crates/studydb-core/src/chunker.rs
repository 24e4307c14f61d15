//! Fixed-size character windows with overlap.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters.
    pub size: usize,
    /// Characters shared by consecutive windows. Must be smaller than `size`.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { size: 500, overlap: 50 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.size == 0 {
            return Err(Error::Configuration("chunk size must be positive".into()));
        }
        if self.overlap >= self.size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<String>, Error> {
        chunk_text(text, self.size, self.overlap)
    }
}

/// Splits `text` into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// Splitting stops with the first window that reaches the end of the text, so
/// for `len > overlap` the number of windows is
/// `ceil((len - overlap) / (size - overlap))` and every window but the last is
/// exactly `size` long. Empty text yields no windows.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, Error> {
    ChunkingConfig { size, overlap }.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    // Byte offset of every char boundary, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::with_capacity(len.saturating_sub(overlap).div_ceil(step).max(1));
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end >= len {
            break;
        }
        start += step;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_overlap_by_configured_amount() {
        let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = chunk_text("ééééé", 2, 0).unwrap();
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(chunk_text("abc", 3, 3).is_err());
        assert!(chunk_text("abc", 0, 0).is_err());
    }
}
