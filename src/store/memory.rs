//! In-memory store implementations for tests.
//!
//! Both stores keep their state behind `std::sync::RwLock`. The content
//! store carries switches that simulate failures the SQLite backend can
//! produce: rejected writes, a vector index that has not been built, and a
//! search path that reports corruption.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{IndexError, Result};
use crate::models::{Chunk, FileRecord, SearchHit};

use super::{ContentStore, MetadataStore};

/// In-memory [`MetadataStore`].
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<BTreeMap<String, i64>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, path: &str) -> Result<Option<i64>> {
        Ok(self.records.read().unwrap().get(path).copied())
    }

    async fn put(&self, path: &str, last_updated_ns: i64) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(path.to_string(), last_updated_ns);
        Ok(())
    }

    async fn delete(&self, paths: &[String]) -> Result<u64> {
        let mut records = self.records.write().unwrap();
        Ok(paths.iter().filter(|p| records.remove(*p).is_some()).count() as u64)
    }

    async fn all_paths(&self) -> Result<HashSet<String>> {
        Ok(self.records.read().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<u64> {
        let mut records = self.records.write().unwrap();
        let n = records.len() as u64;
        records.clear();
        Ok(n)
    }

    async fn row_count(&self) -> Result<u64> {
        Ok(self.records.read().unwrap().len() as u64)
    }

    async fn records(&self) -> Result<Vec<FileRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .map(|(path, ts)| FileRecord {
                path: path.clone(),
                last_updated_ns: *ts,
            })
            .collect())
    }
}

/// In-memory [`ContentStore`] with brute-force cosine search.
pub struct InMemoryContentStore {
    chunks: RwLock<Vec<Chunk>>,
    fail_upserts: AtomicBool,
    corrupt_search: AtomicBool,
    index_built: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            fail_upserts: AtomicBool::new(false),
            corrupt_search: AtomicBool::new(false),
            index_built: AtomicBool::new(true),
        }
    }

    /// Make every subsequent `upsert` fail with a transient error.
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `search` report corruption.
    pub fn set_corrupt_search(&self, corrupt: bool) {
        self.corrupt_search.store(corrupt, Ordering::SeqCst);
    }

    /// When false, `indexed_count` reports zero regardless of contents.
    pub fn set_index_built(&self, built: bool) {
        self.index_built.store(built, Ordering::SeqCst);
    }

    /// Drop every chunk without touching anything else.
    pub fn wipe(&self) {
        self.chunks.write().unwrap().clear();
    }

    /// Every `(source_path, text)` pair currently stored, sorted.
    pub fn contents(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .map(|c| (c.source_path.clone(), c.text.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(IndexError::TransientStore(
                "content store unavailable".to_string(),
            ));
        }
        let mut stored = self.chunks.write().unwrap();
        for chunk in chunks {
            stored.retain(|c| c.id != chunk.id);
            stored.push(chunk.clone());
        }
        Ok(())
    }

    async fn delete_by_path(&self, paths: &[String]) -> Result<u64> {
        let mut stored = self.chunks.write().unwrap();
        let before = stored.len();
        stored.retain(|c| !paths.contains(&c.source_path));
        Ok((before - stored.len()) as u64)
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if self.corrupt_search.load(Ordering::SeqCst) {
            return Err(IndexError::CorruptionDetected(
                "simulated segment damage".to_string(),
            ));
        }
        let stored = self.chunks.read().unwrap();
        let mut hits: Vec<SearchHit> = stored
            .iter()
            .filter(|c| !c.embedding.is_empty())
            .map(|c| SearchHit {
                chunk_id: c.id.clone(),
                source_path: c.source_path.clone(),
                text: c.text.clone(),
                score: cosine_similarity(query_vec, &c.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.chunks.read().unwrap().len() as u64)
    }

    async fn indexed_count(&self) -> Result<u64> {
        if !self.index_built.load(Ordering::SeqCst) {
            return Ok(0);
        }
        Ok(self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| !c.embedding.is_empty())
            .count() as u64)
    }

    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.source_path == path)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn all_source_paths(&self) -> Result<HashSet<String>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .iter()
            .map(|c| c.source_path.clone())
            .collect())
    }
}
