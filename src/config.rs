//! TOML configuration parsing and validation.
//!
//! A single file (default `./config/docsync.toml`) describes where the two
//! stores live, which tree to crawl, how files are split into chunks, which
//! embedding provider to use, and the thresholds of the integrity checker.
//!
//! ```toml
//! [db]
//! metadata_path = "./data/metadata.sqlite"
//! content_path = "./data/content.sqlite"
//!
//! [index]
//! root = "./docs"
//! extensions = ["md", "txt", "pdf"]
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 200
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub metadata_path: PathBuf,
    pub content_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_true")]
    pub start_indexing: bool,
    #[serde(default)]
    pub rescan_interval_secs: u64,
}

fn default_extensions() -> Vec<String> {
    ["pdf", "docx", "xlsx", "txt", "md", "csv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

impl IndexConfig {
    /// Allow-listed extensions, lowercased and without a leading dot.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Dimensionality used by the local `hash` provider when `dims` is unset.
pub const DEFAULT_HASH_DIMS: usize = 384;

impl EmbeddingConfig {
    pub fn effective_dims(&self) -> usize {
        self.dims.unwrap_or(DEFAULT_HASH_DIMS)
    }
}

/// Thresholds used by the integrity checker.
#[derive(Debug, Deserialize, Clone)]
pub struct IntegrityConfig {
    /// Above this many chunks the content store is expected to have built
    /// its vector index.
    #[serde(default = "default_indexing_threshold")]
    pub indexing_threshold: u64,
    #[serde(default = "default_expected_chunks_per_file")]
    pub expected_chunks_per_file: f64,
    #[serde(default = "default_min_chunk_ratio")]
    pub min_chunk_ratio: f64,
    /// Treat a low chunk ratio as corruption instead of a warning.
    #[serde(default)]
    pub strict_ratio: bool,
    #[serde(default = "default_probe_query")]
    pub probe_query: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            indexing_threshold: default_indexing_threshold(),
            expected_chunks_per_file: default_expected_chunks_per_file(),
            min_chunk_ratio: default_min_chunk_ratio(),
            strict_ratio: false,
            probe_query: default_probe_query(),
        }
    }
}

fn default_indexing_threshold() -> u64 {
    10_000
}
fn default_expected_chunks_per_file() -> f64 {
    3.0
}
fn default_min_chunk_ratio() -> f64 {
    0.1
}
fn default_probe_query() -> String {
    "test".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prefix of stored paths to rewrite in result links.
    #[serde(default)]
    pub path_prefix_from: Option<String>,
    #[serde(default)]
    pub path_prefix_to: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path_prefix_from: None,
            path_prefix_to: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8001".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.index.normalized_extensions().is_empty() {
        bail!("index.extensions must list at least one extension");
    }

    if config.retrieval.limit == 0 {
        bail!("retrieval.limit must be >= 1");
    }

    if config.db.metadata_path == config.db.content_path {
        bail!("db.metadata_path and db.content_path must be different files");
    }

    if config.integrity.expected_chunks_per_file <= 0.0 {
        bail!("integrity.expected_chunks_per_file must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0");
            }
        }
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    Ok(())
}
