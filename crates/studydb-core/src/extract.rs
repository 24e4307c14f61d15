//! Text extraction collaborators and the extension-keyed registry.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;
use crate::traits::Extractor;

/// Reads plain text and markdown. Invalid UTF-8 is replaced, not rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extensions(&self) -> &[&str] {
        &["txt", "text", "md", "markdown"]
    }

    fn extract(&self, path: &Path) -> anyhow::Result<String> {
        let bytes = fs::read(path).map_err(|e| Error::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Dispatches extraction on the lowercase file extension.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self { by_extension: HashMap::new() }
    }

    /// Registers `extractor` for every extension it declares, replacing any
    /// previous registration for those extensions.
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        for ext in extractor.extensions() {
            self.by_extension.insert(ext.to_lowercase(), Arc::clone(&extractor));
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.by_extension.contains_key(&ext))
    }

    pub fn extract(&self, path: &Path) -> anyhow::Result<String> {
        let ext = extension_of(path).unwrap_or_default();
        let extractor = self.by_extension.get(&ext).ok_or_else(|| Error::Extraction {
            path: path.to_path_buf(),
            reason: format!("unsupported file type: .{ext}"),
        })?;
        extractor.extract(path)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PlainTextExtractor);
        registry
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Expands `paths` into a sorted list of files: directories are walked
/// recursively, plain files are kept as given.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}
