//! Structured chunk metadata.
//!
//! Upstream callers hand in an open JSON mapping. At the ingestion boundary it
//! is folded into [`ChunkMetadata`]: the well-known keys become typed fields and
//! everything else is kept verbatim in `extra`. Serialized form is camelCase
//! (`filename`, `sourcePath`, `subject`, `chunkIndex`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const UNKNOWN_FILENAME: &str = "unknown";
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, alias = "source_path", skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, alias = "chunk_index")]
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Consumer-defined kind, e.g. `"lecture"`. Serialized as `type`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, alias = "ingested_at", skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
    #[serde(default, alias = "size_bytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChunkMetadata {
    /// Builds a record from an upstream open mapping.
    ///
    /// Well-known keys holding a value of the wrong type are dropped rather
    /// than failing the ingestion. `chunkIndex` is always assigned by the
    /// engine, so any upstream value is discarded.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let filename = take_string(&mut map, &["filename"]);
        let source_path = take_string(&mut map, &["sourcePath", "source_path"]);
        let subject = take_string(&mut map, &["subject"]);
        let title = take_string(&mut map, &["title"]);
        let kind = take_string(&mut map, &["type"]);
        let ingested_at = take_string(&mut map, &["ingestedAt", "ingested_at"]);
        let size_bytes = ["sizeBytes", "size_bytes"]
            .iter()
            .filter_map(|k| map.remove(*k))
            .find_map(|v| v.as_u64());
        map.remove("chunkIndex");
        map.remove("chunk_index");
        Self {
            filename,
            source_path,
            subject,
            chunk_index: 0,
            title,
            kind,
            ingested_at,
            size_bytes,
            extra: map.into_iter().collect(),
        }
    }

    /// Same as [`ChunkMetadata::from_map`] for any JSON value; non-objects
    /// yield an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => {
                debug!(value = %other, "metadata is not an object; using empty record");
                Self::default()
            }
        }
    }

    /// Parses metadata as persisted by the content store.
    ///
    /// Never fails: malformed input degrades to the most that can be salvaged,
    /// and ultimately to an empty record.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        if let Ok(meta) = serde_json::from_str::<Self>(raw) {
            return meta;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => {
                let chunk_index = ["chunkIndex", "chunk_index"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_u64))
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(0);
                Self { chunk_index, ..Self::from_map(map) }
            }
            _ => {
                debug!("unparsable stored metadata; using empty record");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Grouping key for a logical document: `sourcePath`, else `filename`.
    pub fn document_key(&self) -> &str {
        self.source_path
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or(UNKNOWN_FILENAME)
    }

    pub fn filename_or_default(&self) -> &str {
        self.filename.as_deref().unwrap_or(UNKNOWN_FILENAME)
    }

    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or(UNCATEGORIZED)
    }

    /// File extension derived from `filename`: `"txt"` when the filename is
    /// unknown, empty when a known filename has no extension.
    pub fn file_type(&self) -> String {
        match self.filename.as_deref() {
            None | Some(UNKNOWN_FILENAME) => "txt".to_string(),
            Some(f) => std::path::Path::new(f)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

fn take_string(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        match map.remove(*key) {
            Some(Value::String(s)) if found.is_none() => found = Some(s),
            Some(Value::String(_)) | None => {}
            Some(other) => debug!(key = *key, value = %other, "dropping non-string metadata value"),
        }
    }
    found
}
