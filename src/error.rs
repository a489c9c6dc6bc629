//! Error taxonomy for the indexing engine.
//!
//! File-level failures never abort the pipeline: each variant maps to a
//! recovery policy applied by the caller.
//!
//! | Variant | Policy |
//! |---------|--------|
//! | [`IndexError::UnsupportedFormat`] | skip the file, retried on every pass |
//! | [`IndexError::TransientStore`] | log, leave metadata untouched |
//! | [`IndexError::CorruptionDetected`] | integrity checker clears the metadata store |
//! | [`IndexError::CrawlEntry`] | skip the filesystem entry, keep crawling |

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("unsupported format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("store error: {0}")]
    TransientStore(String),

    #[error("corruption detected: {0}")]
    CorruptionDetected(String),

    #[error("crawl entry {path:?}: {message}")]
    CrawlEntry { path: PathBuf, message: String },

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl IndexError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexError::CorruptionDetected(_))
    }
}

/// SQLite primary result codes that mean the file itself is damaged.
const SQLITE_CORRUPT: &str = "11";
const SQLITE_NOTADB: &str = "26";

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code();
            let primary = code.as_deref().map(|c| {
                // Extended codes carry the primary code in the low byte.
                c.parse::<i32>()
                    .map(|n| (n & 0xff).to_string())
                    .unwrap_or_else(|_| c.to_string())
            });
            let message = db_err.message().to_ascii_lowercase();
            if matches!(primary.as_deref(), Some(SQLITE_CORRUPT) | Some(SQLITE_NOTADB))
                || message.contains("malformed")
                || message.contains("not a database")
            {
                return IndexError::CorruptionDetected(db_err.message().to_string());
            }
        }
        IndexError::TransientStore(err.to_string())
    }
}
