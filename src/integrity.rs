//! Integrity checker.
//!
//! Compares aggregate counts of the two stores and runs a live search probe
//! against the content store. A hard inconsistency clears the whole
//! metadata store, leaving the content store alone: every file then
//! classifies as `new` on the next crawl and is reindexed, and the
//! reconciler's delete-before-insert cleans up leftover chunks path by path.
//!
//! | Check | Severity |
//! |-------|----------|
//! | metadata rows > 0, content count == 0 | hard |
//! | search probe raises a corruption-class error | hard |
//! | content count > threshold, indexed count == 0 | warning |
//! | content count / (rows × expected chunks per file) < minimum | warning (hard with `strict_ratio`) |
//! | search probe fails for any other reason | warning |
//!
//! Safe to run at startup and periodically.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::IntegrityConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::store::{ContentStore, MetadataStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    ContentStoreEmpty,
    IndexNotBuilt,
    ProbeCorruption,
    ProbeFailed,
    LowChunkRatio,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub metadata_rows: u64,
    pub content_count: u64,
    pub indexed_count: u64,
    pub findings: Vec<Finding>,
    /// Metadata records removed by the recovery action.
    pub cleared: u64,
    pub dry_run: bool,
}

impl IntegrityReport {
    pub fn needs_recovery(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Hard)
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    fn push(&mut self, kind: FindingKind, severity: Severity, message: String) {
        self.findings.push(Finding {
            kind,
            severity,
            message,
        });
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "metadata rows:   {}", self.metadata_rows)?;
        writeln!(f, "content chunks:  {}", self.content_count)?;
        writeln!(f, "indexed vectors: {}", self.indexed_count)?;
        if self.findings.is_empty() {
            writeln!(f, "status:          consistent")?;
        }
        for finding in &self.findings {
            let label = match finding.severity {
                Severity::Hard => "HARD",
                Severity::Warning => "warn",
            };
            writeln!(f, "  [{}] {}", label, finding.message)?;
        }
        if self.needs_recovery() {
            if self.dry_run {
                writeln!(f, "dry run: metadata store left as is")?;
            } else {
                writeln!(
                    f,
                    "cleared {} metadata records; next sync reindexes every file",
                    self.cleared
                )?;
            }
        }
        Ok(())
    }
}

pub struct IntegrityChecker {
    metadata: Arc<dyn MetadataStore>,
    content: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: IntegrityConfig,
}

impl IntegrityChecker {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IntegrityConfig,
    ) -> Self {
        Self {
            metadata,
            content,
            embedder,
            config,
        }
    }

    /// Run every check and, unless `dry_run`, clear the metadata store on a
    /// hard inconsistency.
    pub async fn check(&self, dry_run: bool) -> Result<IntegrityReport> {
        let mut report = IntegrityReport {
            dry_run,
            ..Default::default()
        };

        report.metadata_rows = self.metadata.row_count().await?;

        match self.content.count().await {
            Ok(n) => report.content_count = n,
            Err(e) if e.is_corruption() => {
                report.push(
                    FindingKind::ProbeCorruption,
                    Severity::Hard,
                    format!("content store unreadable: {}", e),
                );
            }
            Err(e) => return Err(e),
        }
        report.indexed_count = match self.content.indexed_count().await {
            Ok(n) => n,
            Err(e) if e.is_corruption() => {
                report.push(
                    FindingKind::ProbeCorruption,
                    Severity::Hard,
                    format!("content index unreadable: {}", e),
                );
                0
            }
            Err(e) => return Err(e),
        };

        self.check_counts(&mut report);
        self.probe(&mut report).await;

        for finding in &report.findings {
            match finding.severity {
                Severity::Hard => error!(kind = ?finding.kind, "{}", finding.message),
                Severity::Warning => warn!(kind = ?finding.kind, "{}", finding.message),
            }
        }

        if report.needs_recovery() && !dry_run {
            report.cleared = self.metadata.clear_all().await?;
            warn!(
                cleared = report.cleared,
                "index inconsistent, metadata store cleared to force full reindex"
            );
        } else if report.findings.is_empty() {
            info!(
                metadata_rows = report.metadata_rows,
                content_count = report.content_count,
                "integrity check passed"
            );
        }

        Ok(report)
    }

    fn check_counts(&self, report: &mut IntegrityReport) {
        let rows = report.metadata_rows;
        let count = report.content_count;

        if rows > 0 && count == 0 && !report.has(FindingKind::ProbeCorruption) {
            report.push(
                FindingKind::ContentStoreEmpty,
                Severity::Hard,
                format!("{} tracked files but the content store is empty", rows),
            );
        }

        if count > self.config.indexing_threshold && report.indexed_count == 0 {
            report.push(
                FindingKind::IndexNotBuilt,
                Severity::Warning,
                format!(
                    "{} chunks stored but no searchable vectors (index not built yet?)",
                    count
                ),
            );
        }

        if rows > 0 && count > 0 {
            let expected = rows as f64 * self.config.expected_chunks_per_file;
            let ratio = count as f64 / expected;
            if ratio < self.config.min_chunk_ratio {
                let severity = if self.config.strict_ratio {
                    Severity::Hard
                } else {
                    Severity::Warning
                };
                report.push(
                    FindingKind::LowChunkRatio,
                    severity,
                    format!(
                        "{} chunks for {} files (ratio {:.3} below {})",
                        count, rows, ratio, self.config.min_chunk_ratio
                    ),
                );
            }
        }
    }

    async fn probe(&self, report: &mut IntegrityReport) {
        let result = match embed_query(self.embedder.as_ref(), &self.config.probe_query).await {
            Ok(vector) => self.content.search(&vector, 1).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {}
            Err(e @ IndexError::CorruptionDetected(_)) => report.push(
                FindingKind::ProbeCorruption,
                Severity::Hard,
                format!("search probe failed: {}", e),
            ),
            Err(e) => report.push(
                FindingKind::ProbeFailed,
                Severity::Warning,
                format!("search probe failed: {}", e),
            ),
        }
    }
}
