//! Persistent chunk store with a full-text index.
//!
//! Each chunk is one tantivy document holding its id, content and serialized
//! metadata, so the record and its full-text entry are written by the same
//! commit. The next id to hand out travels in the commit payload, which keeps
//! ids strictly increasing and never reused across restarts.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

use studydb_core::metadata::ChunkMetadata;
use studydb_core::types::{Chunk, ChunkId, DocumentSummary, NewChunk, SubjectFilter};

use crate::schema::{build_schema, register_tokenizer, StoreFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;
/// Keyword lookups fetch this many candidates per requested result, since the
/// subject filter is applied after the full-text query.
pub const KEYWORD_OVERFETCH: usize = 5;
/// First id handed out by an empty store.
pub const FIRST_ID: ChunkId = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CommitPayload {
    next_id: ChunkId,
}

pub struct ContentStore {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: StoreFields,
    next_id: ChunkId,
    dir: PathBuf,
}

impl ContentStore {
    /// Opens the store in `dir`, creating an empty one if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let directory = MmapDirectory::open(&dir)?;
        let index = Index::open_or_create(directory, build_schema())?;
        register_tokenizer(&index);
        let fields = StoreFields::resolve(&index.schema())?;
        let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let next_id = recover_next_id(&index, &reader.searcher())?;
        info!(dir = %dir.display(), chunks = reader.searcher().num_docs(), next_id, "content store opened");
        Ok(Self { index, reader, writer, fields, next_id, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists one chunk and returns its id.
    pub fn add(&mut self, content: &str, metadata: &ChunkMetadata) -> Result<ChunkId> {
        let ids = self.add_many(&[NewChunk { content: content.to_string(), metadata: metadata.clone() }])?;
        ids.into_iter().next().ok_or_else(|| anyhow!("content store returned no id"))
    }

    /// Persists all chunks under a single commit. Returned ids follow input
    /// order and are strictly increasing.
    pub fn add_many(&mut self, chunks: &[NewChunk]) -> Result<Vec<ChunkId>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = self.next_id;
            self.next_id += 1;
            let metadata_json = chunk.metadata.to_json()?;
            self.writer.add_document(doc!(
                self.fields.id => id,
                self.fields.content => chunk.content.as_str(),
                self.fields.metadata => metadata_json,
            ))?;
            ids.push(id);
        }
        self.commit()?;
        debug!(count = ids.len(), first = ids[0], "chunks persisted");
        Ok(ids)
    }

    fn commit(&mut self) -> Result<()> {
        let payload = serde_json::to_string(&CommitPayload { next_id: self.next_id })?;
        let mut prepared = self.writer.prepare_commit()?;
        prepared.set_payload(&payload);
        prepared.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn get(&self, id: ChunkId) -> Result<Option<Chunk>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(Term::from_field_u64(self.fields.id, id), IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, addr)) => {
                let doc: TantivyDocument = searcher.doc(*addr)?;
                Ok(Some(self.to_chunk(&doc)?))
            }
            None => Ok(None),
        }
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full-text lookup over content and metadata, best match first.
    ///
    /// Fetches `k * KEYWORD_OVERFETCH` candidates (capped at the document
    /// count), drops those whose subject does not match `subject`
    /// (case-insensitive), and keeps the first `k`.
    /// Query syntax errors are tolerated: the parsable part of the query is used.
    pub fn search_keyword(&self, query: &str, k: usize, subject: Option<&str>) -> Result<Vec<Chunk>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let filter = SubjectFilter::new(subject);
        let searcher = self.reader.searcher();
        let mut parser = QueryParser::for_index(&self.index, vec![self.fields.content, self.fields.metadata]);
        parser.set_conjunction_by_default();
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!(query, errors = errors.len(), "query parsed leniently");
        }
        let docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let limit = k.saturating_mul(KEYWORD_OVERFETCH).min(docs);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let top = searcher.search(&*parsed, &TopDocs::with_limit(limit))?;
        let mut results = Vec::with_capacity(k.min(limit));
        for (_score, addr) in top {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let chunk = self.to_chunk(&doc)?;
            if filter.as_ref().is_some_and(|f| !f.matches(&chunk.metadata)) {
                continue;
            }
            results.push(chunk);
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// Every chunk, ascending by id.
    pub fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let searcher = self.reader.searcher();
        let addrs = searcher.search(&AllQuery, &DocSetCollector)?;
        let mut chunks = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            chunks.push(self.to_chunk(&doc)?);
        }
        chunks.sort_by_key(|c| c.id);
        Ok(chunks)
    }

    pub fn ids(&self) -> Result<Vec<ChunkId>> {
        Ok(self.all_chunks()?.into_iter().map(|c| c.id).collect())
    }

    /// One summary per distinct `sourcePath` (falling back to `filename`),
    /// represented by its lowest-id chunk. The subject filter is applied before
    /// grouping.
    pub fn list_documents(&self, subject: Option<&str>) -> Result<Vec<DocumentSummary>> {
        let filter = SubjectFilter::new(subject);
        let mut seen = HashSet::new();
        let mut documents = Vec::new();
        for chunk in self.all_chunks()? {
            if filter.as_ref().is_some_and(|f| !f.matches(&chunk.metadata)) {
                continue;
            }
            if !seen.insert(chunk.metadata.document_key().to_string()) {
                continue;
            }
            let meta = chunk.metadata;
            documents.push(DocumentSummary {
                id: chunk.id,
                filename: meta.filename_or_default().to_string(),
                subject: meta.subject_or_default().to_string(),
                file_type: meta.file_type(),
                size_bytes: meta.size_bytes,
                ingested_at: meta.ingested_at.clone(),
                metadata: meta,
            });
        }
        Ok(documents)
    }

    /// Distinct subjects present in any chunk's metadata, sorted.
    pub fn list_subjects(&self) -> Result<Vec<String>> {
        let subjects: BTreeSet<String> = self
            .all_chunks()?
            .into_iter()
            .filter_map(|c| c.metadata.subject)
            .collect();
        Ok(subjects.into_iter().collect())
    }

    fn to_chunk(&self, doc: &TantivyDocument) -> Result<Chunk> {
        let id = doc
            .get_first(self.fields.id)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("stored record without id"))?;
        let content = doc.get_first(self.fields.content).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let metadata = ChunkMetadata::from_json(doc.get_first(self.fields.metadata).and_then(|v| v.as_str()).unwrap_or(""));
        Ok(Chunk { id, content, metadata })
    }
}

/// The larger of the committed payload and one past the highest stored id.
fn recover_next_id(index: &Index, searcher: &Searcher) -> Result<ChunkId> {
    let from_payload = index
        .load_metas()?
        .payload
        .and_then(|p| serde_json::from_str::<CommitPayload>(&p).ok())
        .map_or(FIRST_ID, |p| p.next_id);
    let mut from_records = FIRST_ID;
    for segment in searcher.segment_readers() {
        if segment.num_docs() == 0 {
            continue;
        }
        let ids = segment.fast_fields().u64("id")?;
        from_records = from_records.max(ids.max_value() + 1);
    }
    Ok(from_payload.max(from_records))
}
