//! Purge: drop index entries for files that no longer exist.
//!
//! `removed = tracked paths − paths seen by the crawl`, where the tracked
//! paths are the union of the metadata store's keys and every source path
//! the content store still holds chunks for. The content side matters after
//! a recovery: once the integrity checker has cleared the metadata store, a
//! file deleted before the next pass is only known by its chunks.
//!
//! Chunks go first, then the metadata records, so an interruption between
//! the two leaves records whose chunks are already gone; the next purge
//! removes them, and the integrity checker catches the count mismatch.
//!
//! Only a [`CrawlReport`] from a completed crawl may be purged against.
//! Paths below an entry the crawl could not read are kept.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::crawler::CrawlReport;
use crate::error::Result;
use crate::store::{ContentStore, MetadataStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Paths removed from either store, sorted.
    pub removed_paths: Vec<String>,
    pub chunks_deleted: u64,
    pub records_deleted: u64,
}

/// Paths known to either store.
async fn tracked_paths(
    metadata: &dyn MetadataStore,
    content: &dyn ContentStore,
) -> Result<HashSet<String>> {
    let mut tracked = metadata.all_paths().await?;
    tracked.extend(content.all_source_paths().await?);
    Ok(tracked)
}

/// Remove every tracked path absent from `existing_paths`.
///
/// Idempotent: a second call with the same input finds nothing to remove.
pub async fn purge(
    existing_paths: &HashSet<String>,
    metadata: &dyn MetadataStore,
    content: &dyn ContentStore,
) -> Result<PurgeReport> {
    let tracked = tracked_paths(metadata, content).await?;
    remove_untracked(&tracked, existing_paths, metadata, content).await
}

/// Purge against a completed crawl, keeping paths shadowed by unreadable
/// entries.
pub async fn purge_after_crawl(
    report: &CrawlReport,
    metadata: &dyn MetadataStore,
    content: &dyn ContentStore,
) -> Result<PurgeReport> {
    let tracked = tracked_paths(metadata, content).await?;
    if report.unreadable.is_empty() {
        return remove_untracked(&tracked, &report.existing_paths, metadata, content).await;
    }

    let mut keep = report.existing_paths.clone();
    keep.extend(tracked.iter().filter(|p| report.is_shadowed(p)).cloned());
    remove_untracked(&tracked, &keep, metadata, content).await
}

async fn remove_untracked(
    tracked: &HashSet<String>,
    keep: &HashSet<String>,
    metadata: &dyn MetadataStore,
    content: &dyn ContentStore,
) -> Result<PurgeReport> {
    let mut removed: Vec<String> = tracked.difference(keep).cloned().collect();
    removed.sort();

    if removed.is_empty() {
        debug!(tracked = tracked.len(), "purge: nothing to remove");
        return Ok(PurgeReport::default());
    }

    let chunks_deleted = content.delete_by_path(&removed).await?;
    let records_deleted = metadata.delete(&removed).await?;

    info!(
        files = removed.len(),
        chunks = chunks_deleted,
        records = records_deleted,
        "purged deleted files"
    );
    for path in &removed {
        debug!(path = %path, "purged");
    }

    Ok(PurgeReport {
        removed_paths: removed,
        chunks_deleted,
        records_deleted,
    })
}
