//! Storage abstraction for the two persisted stores.
//!
//! - [`MetadataStore`] maps a file path to the modification time of the
//!   version that is currently indexed. It answers "have I already indexed
//!   this version of this file".
//! - [`ContentStore`] holds the chunks and their embedding vectors, keyed by
//!   generated id and filterable by exact source path.
//!
//! The engine never assumes the two are updated atomically together. It
//! orders its writes (content first, metadata last) and repairs divergence
//! through the integrity checker instead.
//!
//! Implementations must be `Send + Sync` to be shared across tasks.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Chunk, FileRecord, SearchHit};

pub use memory::{InMemoryContentStore, InMemoryMetadataStore};
pub use sqlite::{SqliteContentStore, SqliteMetadataStore};

/// Durable path → last-indexed-timestamp mapping.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](MetadataStore::get) | Timestamp of the indexed version, if any |
/// | [`put`](MetadataStore::put) | Insert or update a record |
/// | [`delete`](MetadataStore::delete) | Remove records for the given paths |
/// | [`all_paths`](MetadataStore::all_paths) | Every tracked path |
/// | [`clear_all`](MetadataStore::clear_all) | Drop every record |
/// | [`row_count`](MetadataStore::row_count) | Number of records |
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<i64>>;

    async fn put(&self, path: &str, last_updated_ns: i64) -> Result<()>;

    /// Returns the number of records removed.
    async fn delete(&self, paths: &[String]) -> Result<u64>;

    async fn all_paths(&self) -> Result<HashSet<String>>;

    /// Returns the number of records removed.
    async fn clear_all(&self) -> Result<u64>;

    async fn row_count(&self) -> Result<u64>;

    /// All records ordered by path.
    async fn records(&self) -> Result<Vec<FileRecord>>;
}

/// Chunk storage with similarity search.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a batch of chunks (with their vectors) as one logical write.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Delete every chunk whose source path is in `paths`. Returns the
    /// number of chunks removed.
    async fn delete_by_path(&self, paths: &[String]) -> Result<u64>;

    /// Rank stored chunks by cosine similarity to `query_vec`.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<u64>;

    /// Number of chunks with a searchable vector.
    async fn indexed_count(&self) -> Result<u64>;

    /// Chunks attributed to `path`, ordered by position.
    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>>;

    /// Every distinct source path that owns at least one chunk.
    async fn all_source_paths(&self) -> Result<HashSet<String>>;
}
