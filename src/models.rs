//! Core data models used throughout the indexing engine.
//!
//! These types represent the records that flow from the crawler through the
//! work queue into the reconciler, and the chunks held by the content store.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Metadata store row: the version of a file that is currently indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    /// File mtime in nanoseconds since the Unix epoch.
    pub last_updated_ns: i64,
}

/// Queue message produced by the crawler for one candidate file.
#[derive(Debug, Clone)]
pub struct DiscoveryRecord {
    pub path: PathBuf,
    /// Fresh id per discovery, used only to correlate log lines.
    pub file_id: String,
    pub last_updated_ns: i64,
}

impl DiscoveryRecord {
    pub fn new(path: PathBuf, last_updated_ns: i64) -> Self {
        Self {
            path,
            file_id: uuid::Uuid::new_v4().to_string(),
            last_updated_ns,
        }
    }

    /// The metadata/content store key for this file.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// A fragment of a file's content, the unit of insertion and deletion in
/// the content store.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// Result of comparing a discovery against the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingStatus {
    New,
    Stale,
    Current,
}

impl IndexingStatus {
    pub fn classify(stored: Option<i64>, observed: i64) -> Self {
        match stored {
            None => IndexingStatus::New,
            Some(ts) if ts < observed => IndexingStatus::Stale,
            Some(_) => IndexingStatus::Current,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingStatus::New => "new",
            IndexingStatus::Stale => "stale",
            IndexingStatus::Current => "current",
        }
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source_path: String,
    pub text: String,
    pub score: f32,
}

/// Response body of the query surface.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryOutput {
    pub links: BTreeSet<String>,
    pub output: String,
}
