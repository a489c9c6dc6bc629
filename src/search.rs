//! Query surface over the content store.
//!
//! [`find`] embeds a free-text query, takes the `limit` most similar
//! chunks and folds them into a [`QueryOutput`]: the set of `file://` links
//! of the files they came from, and their texts joined with `". "` in rank
//! order. No hits, or a failing store, is [`FindError`].

use std::collections::BTreeSet;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::IndexError;
use crate::models::{QueryOutput, SearchHit};
use crate::pipeline::Engine;
use crate::store::ContentStore;

pub const NOTHING_FOUND: &str = "Unable to find anything for the given query";

#[derive(Debug, Error)]
pub enum FindError {
    #[error("Unable to find anything for the given query")]
    NothingFound,
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Rewrites the leading part of stored paths before they become links,
/// e.g. a container mount point to the host directory it maps.
#[derive(Debug, Clone, Default)]
pub struct LinkRewrite {
    from: Option<String>,
    to: Option<String>,
}

impl LinkRewrite {
    pub fn new(from: Option<String>, to: Option<String>) -> Self {
        Self { from, to }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.path_prefix_from.clone(), server.path_prefix_to.clone())
    }

    pub fn link(&self, path: &str) -> String {
        let rewritten = match (&self.from, &self.to) {
            (Some(from), Some(to)) if path.starts_with(from.as_str()) => {
                format!("{}{}", to, &path[from.len()..])
            }
            _ => path.to_string(),
        };
        format!("file://{}", rewritten)
    }
}

/// Rank chunks for `query`.
pub async fn search_hits(
    query: &str,
    embedder: &dyn EmbeddingProvider,
    content: &dyn ContentStore,
    limit: usize,
) -> std::result::Result<Vec<SearchHit>, IndexError> {
    let vector = embed_query(embedder, query).await?;
    content.search(&vector, limit).await
}

pub async fn find(
    query: &str,
    embedder: &dyn EmbeddingProvider,
    content: &dyn ContentStore,
    limit: usize,
    rewrite: &LinkRewrite,
) -> std::result::Result<QueryOutput, FindError> {
    if query.trim().is_empty() {
        return Err(FindError::NothingFound);
    }
    info!(query, "searching");

    let hits = search_hits(query, embedder, content, limit).await?;
    if hits.is_empty() {
        return Err(FindError::NothingFound);
    }
    info!(query, hits = hits.len(), "search finished");

    let links: BTreeSet<String> = hits.iter().map(|h| rewrite.link(&h.source_path)).collect();
    let output = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(". ");

    Ok(QueryOutput { links, output })
}

/// `docsync search`: print ranked hits and the combined output.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let engine = Engine::open(config).await?;
    let limit = limit.unwrap_or(config.retrieval.limit);
    let rewrite = LinkRewrite::from_config(&config.server);

    let hits = match search_hits(query, engine.embedder.as_ref(), engine.content.as_ref(), limit)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "search failed");
            return Err(e.into());
        }
    };

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, rewrite.link(&hit.source_path));
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
        println!("    id: {}", hit.chunk_id);
        println!();
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
