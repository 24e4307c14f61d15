//! Flat inner-product index.
//!
//! Vectors are kept row-major in one contiguous buffer and scanned exhaustively
//! on every query, so results are exact and reproducible. Callers are expected
//! to hand in unit-length vectors, which makes the inner product a cosine
//! similarity.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int64Type};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use studydb_core::error::Error;
use studydb_core::vector::dot;

use crate::schema::{build_arrow_schema, snapshot_dim, vector_item_field, ID_COLUMN, VECTOR_COLUMN};

/// Id reported in a result slot that holds no match.
pub const NO_MATCH: i64 = -1;

/// Result of one query: exactly `k` slots, best first. Slots past the number of
/// stored vectors hold [`NO_MATCH`] with a score of negative infinity.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub scores: Vec<f32>,
    pub ids: Vec<i64>,
}

impl Neighbors {
    /// Real matches only, in rank order.
    pub fn hits(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.ids
            .iter()
            .zip(&self.scores)
            .filter(|(id, _)| **id != NO_MATCH)
            .map(|(id, score)| (*id, *score))
    }
}

/// How [`VectorIndex::load_or_empty`] obtained its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLoadOutcome {
    Loaded { vectors: usize },
    /// No snapshot on disk; started empty.
    Missing,
    /// A snapshot existed but could not be used; started empty.
    Recovered { reason: String },
}

impl IndexLoadOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    ids: Vec<i64>,
    data: Vec<f32>,
    positions: HashMap<i64, usize>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 || i32::try_from(dim).is_err() {
            return Err(Error::Configuration(format!("unsupported vector dimension {dim}")).into());
        }
        Ok(Self { dim, ids: Vec::new(), data: Vec::new(), positions: HashMap::new() })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    /// Stored ids in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Appends `vectors[i]` under `ids[i]`.
    ///
    /// The whole call is validated before anything is stored: a wrong
    /// dimension, a reserved id or an id already present (in the index or
    /// earlier in the same call) leaves the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>], ids: &[i64]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(Error::InvalidArgument(format!("{} vectors for {} ids", vectors.len(), ids.len())).into());
        }
        let mut incoming = HashSet::with_capacity(ids.len());
        for (vector, &id) in vectors.iter().zip(ids) {
            if vector.len() != self.dim {
                return Err(Error::DimensionMismatch { expected: self.dim, got: vector.len() }.into());
            }
            if id == NO_MATCH {
                return Err(Error::InvalidArgument(format!("id {NO_MATCH} is reserved")).into());
            }
            if self.contains(id) || !incoming.insert(id) {
                return Err(Error::DuplicateId(id).into());
            }
        }
        self.data.reserve(vectors.len() * self.dim);
        for (vector, &id) in vectors.iter().zip(ids) {
            self.positions.insert(id, self.ids.len());
            self.ids.push(id);
            self.data.extend_from_slice(vector);
        }
        debug!(added = ids.len(), total = self.ids.len(), "vectors added");
        Ok(())
    }

    /// Top-`k` neighbors for each query by descending inner product. Equal
    /// scores are ordered by ascending id.
    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Neighbors>> {
        queries.iter().map(|q| self.search_one(q, k)).collect()
    }

    pub fn search_one(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: query.len() }.into());
        }
        let mut scored: Vec<(f32, i64)> = self
            .data
            .chunks_exact(self.dim)
            .zip(&self.ids)
            .map(|(row, id)| (dot(row, query), *id))
            .collect();
        let by_rank = |a: &(f32, i64), b: &(f32, i64)| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1));
        if k < scored.len() {
            scored.select_nth_unstable_by(k, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        let mut neighbors = Neighbors { scores: Vec::with_capacity(k), ids: Vec::with_capacity(k) };
        for (score, id) in scored {
            neighbors.scores.push(score);
            neighbors.ids.push(id);
        }
        neighbors.scores.resize(k, f32::NEG_INFINITY);
        neighbors.ids.resize(k, NO_MATCH);
        Ok(neighbors)
    }

    /// Keeps only vectors whose id satisfies `keep`; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(i64) -> bool) -> usize {
        let before = self.ids.len();
        let mut ids = Vec::with_capacity(before);
        let mut data = Vec::with_capacity(self.data.len());
        for (row, &id) in self.data.chunks_exact(self.dim).zip(&self.ids) {
            if keep(id) {
                ids.push(id);
                data.extend_from_slice(row);
            }
        }
        self.positions = ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        self.ids = ids;
        self.data = data;
        before - self.ids.len()
    }

    /// Writes the whole index to `path` as one snapshot. The file is written
    /// next to its destination and renamed into place, so a reader sees either
    /// the previous snapshot or the new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let batch = self.to_record_batch()?;
        let tmp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = FileWriter::try_new(BufWriter::new(tmp.as_file()), &batch.schema())?;
            writer.write(&batch)?;
            writer.finish()?;
            writer.into_inner()?.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        info!(path = %path.display(), vectors = self.len(), "vector index saved");
        Ok(())
    }

    /// Reads a snapshot that must exist and match `dim`.
    pub fn load(path: &Path, dim: usize) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = FileReader::try_new(file, None).map_err(|e| Error::IndexLoad(e.to_string()))?;
        match snapshot_dim(&reader.schema()) {
            Some(found) if found == dim => {}
            Some(found) => return Err(Error::IndexLoad(format!("snapshot dimension {found}, expected {dim}")).into()),
            None => return Err(Error::IndexLoad("snapshot has no dimension metadata".into()).into()),
        }
        let mut index = Self::new(dim)?;
        for batch in reader {
            let batch = batch.map_err(|e| Error::IndexLoad(e.to_string()))?;
            let (vectors, ids) = decode_batch(&batch, dim)?;
            index.add(&vectors, &ids).map_err(|e| Error::IndexLoad(e.to_string()))?;
        }
        Ok(index)
    }

    /// Loads `path`, falling back to an empty index when the snapshot is absent
    /// or unusable. A discarded snapshot is logged at warn level and reported in
    /// the outcome.
    pub fn load_or_empty(path: &Path, dim: usize) -> Result<(Self, IndexLoadOutcome)> {
        if !path.exists() {
            info!(path = %path.display(), "no vector index snapshot; starting empty");
            return Ok((Self::new(dim)?, IndexLoadOutcome::Missing));
        }
        match Self::load(path, dim) {
            Ok(index) => {
                info!(path = %path.display(), vectors = index.len(), "vector index loaded");
                let vectors = index.len();
                Ok((index, IndexLoadOutcome::Loaded { vectors }))
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(path = %path.display(), %reason, "vector index unusable; starting empty");
                Ok((Self::new(dim)?, IndexLoadOutcome::Recovered { reason }))
            }
        }
    }

    fn to_record_batch(&self) -> Result<RecordBatch> {
        let dim = i32::try_from(self.dim)?;
        let values = Arc::new(Float32Array::from(self.data.clone()));
        let vectors = FixedSizeListArray::try_new(vector_item_field(), dim, values, None)?;
        let ids = Int64Array::from(self.ids.clone());
        Ok(RecordBatch::try_new(build_arrow_schema(self.dim), vec![Arc::new(ids), Arc::new(vectors)])?)
    }
}

fn decode_batch(batch: &RecordBatch, dim: usize) -> Result<(Vec<Vec<f32>>, Vec<i64>)> {
    let ids = batch
        .column_by_name(ID_COLUMN)
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| Error::IndexLoad(format!("missing or mistyped `{ID_COLUMN}` column")))?;
    let list = batch
        .column_by_name(VECTOR_COLUMN)
        .and_then(|c| c.as_fixed_size_list_opt())
        .ok_or_else(|| Error::IndexLoad(format!("missing or mistyped `{VECTOR_COLUMN}` column")))?;
    if usize::try_from(list.value_length()).ok() != Some(dim) {
        return Err(Error::IndexLoad(format!("vector width {}, expected {dim}", list.value_length())).into());
    }
    if ids.null_count() > 0 || list.null_count() > 0 {
        return Err(Error::IndexLoad("snapshot contains null rows".into()).into());
    }
    let mut vectors = Vec::with_capacity(list.len());
    for row in 0..list.len() {
        let value = list.value(row);
        let floats = value
            .as_primitive_opt::<Float32Type>()
            .ok_or_else(|| anyhow!("vector values are not float32"))?;
        vectors.push(floats.values().to_vec());
    }
    Ok((vectors, ids.values().to_vec()))
}
