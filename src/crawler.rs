//! Filesystem crawler.
//!
//! Walks the configured root, keeps files whose extension is allow-listed
//! and that no exclude glob matches, and enqueues one [`DiscoveryRecord`]
//! per eligible file with its current modification time.
//!
//! The crawl is only trusted once it finishes: [`Crawler::crawl`] returns a
//! [`CrawlReport`] carrying every eligible path it saw, and only a report
//! from a completed pass may be handed to [`purge`](crate::purge). A
//! cancelled pass or a missing root is an error, never a short path set.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::models::DiscoveryRecord;
use crate::queue::WorkQueueSender;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Outcome of one completed crawl pass.
#[derive(Debug, Default, Clone)]
pub struct CrawlReport {
    /// Every eligible file observed, as absolute path strings.
    pub existing_paths: HashSet<String>,
    pub enqueued: usize,
    pub skipped: usize,
    /// Entries that could not be read. Files below an unreadable directory
    /// are unknown, not deleted.
    pub unreadable: Vec<PathBuf>,
}

impl CrawlReport {
    /// Whether `path` lies under an entry the crawl could not read.
    pub fn is_shadowed(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.unreadable.iter().any(|u| path.starts_with(u))
    }
}

#[derive(Clone)]
pub struct Crawler {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl Crawler {
    pub fn from_config(config: &IndexConfig) -> anyhow::Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            extensions: config.normalized_extensions().into_iter().collect(),
            exclude: build_globset(&patterns)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree once, enqueueing every eligible file.
    ///
    /// Blocking; run it on the blocking pool.
    pub fn crawl(&self, queue: &WorkQueueSender, cancel: &CancellationToken) -> Result<CrawlReport> {
        let root = std::fs::canonicalize(&self.root).map_err(|e| IndexError::CrawlEntry {
            path: self.root.clone(),
            message: format!("crawl root unavailable: {}", e),
        })?;
        info!(root = %root.display(), "crawl started");

        let mut report = CrawlReport::default();
        let walker = WalkDir::new(&root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    report.unreadable.push(path);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path);
            if self.exclude.is_match(relative) {
                continue;
            }

            let extension = crate::loader::extension_of(path);
            if !self.extensions.contains(&extension) {
                debug!(path = %path.display(), "skipping file with unlisted extension");
                report.skipped += 1;
                continue;
            }

            let modified = match modified_nanos(path) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping entry");
                    report.unreadable.push(path.to_path_buf());
                    continue;
                }
            };

            let record = DiscoveryRecord::new(path.to_path_buf(), modified);
            report.existing_paths.insert(record.key());
            debug!(path = %path.display(), file_id = %record.file_id, "file enqueued");
            queue.enqueue(record)?;
            report.enqueued += 1;
        }

        info!(
            enqueued = report.enqueued,
            skipped = report.skipped,
            unreadable = report.unreadable.len(),
            "crawl completed"
        );
        Ok(report)
    }
}

/// Modification time in nanoseconds since the Unix epoch.
///
/// Sub-second precision matters: two writes within the same second must
/// still compare as different versions.
pub fn modified_nanos(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let nanos = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    Ok(i64::try_from(nanos).unwrap_or(i64::MAX))
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
