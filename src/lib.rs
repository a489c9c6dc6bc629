//! # docsync
//!
//! An incremental document index that stays consistent with the filesystem.
//!
//! docsync crawls a directory tree, splits every supported document into
//! overlapping chunks, embeds them, and keeps two stores in step: a small
//! metadata store recording which version of each file is indexed, and a
//! content store holding the chunks and their vectors. Edits are reindexed,
//! deleted files are purged, and a startup integrity check resets the
//! metadata store when the two have diverged, so the next pass rebuilds
//! whatever is missing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────┐   ┌────────────┐   ┌─────────────────┐
//! │ Crawler │──▶│ Queue │──▶│ Reconciler │──▶│ metadata store  │
//! └────┬────┘   └───────┘   └────────────┘   │ content store   │
//!      │ completed crawl                     └───────┬─────────┘
//!      ▼                                             │
//! ┌─────────┐        ┌───────────────────┐           │
//! │  Purge  │        │ Integrity checker │◀──────────┤
//! └─────────┘        └───────────────────┘           ▼
//!                                            ┌──────────────┐
//!                                            │  CLI / HTTP  │
//!                                            └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsync init                  # create both databases
//! docsync sync                  # index the configured root
//! docsync search "quarterly report"
//! docsync serve                 # HTTP API with background indexing
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Indexing error taxonomy |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`db`] / [`migrate`] | SQLite connections and schemas |
//! | [`store`] | Metadata and content store traits and implementations |
//! | [`queue`] | Work queue between crawler and reconciler |
//! | [`crawler`] | Filesystem walk |
//! | [`loader`] | Format detection and text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`reconciler`] | Per-file indexing |
//! | [`purge`] | Removal of deleted files |
//! | [`integrity`] | Store consistency check and recovery |
//! | [`pipeline`] | Pass orchestration and background service |
//! | [`search`] | Query surface |
//! | [`server`] | HTTP server |
//! | [`stats`] | Store summary |

pub mod chunk;
pub mod config;
pub mod crawler;
pub mod db;
pub mod embedding;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod purge;
pub mod queue;
pub mod reconciler;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
