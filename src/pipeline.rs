//! Pipeline orchestration.
//!
//! One pass runs integrity check → crawl → reconcile → purge:
//!
//! - the crawler walks the tree on the blocking pool and feeds the queue;
//! - the reconciler drains the queue concurrently, one file at a time;
//! - the queue closes when the crawler finishes and drops its sender, the
//!   reconciler drains what is left and stops;
//! - purge runs only if the crawl completed.
//!
//! [`run_service`] repeats passes on an interval until cancelled. All tasks
//! share one [`CancellationToken`], so shutting down cancels them as a unit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::crawler::{CrawlReport, Crawler};
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::integrity::{IntegrityChecker, IntegrityReport};
use crate::migrate;
use crate::purge::{purge_after_crawl, PurgeReport};
use crate::queue::work_queue;
use crate::reconciler::{ReconcileStats, Reconciler};
use crate::store::{ContentStore, MetadataStore, SqliteContentStore, SqliteMetadataStore};

/// The stores and embedder shared by every pipeline stage, plus the
/// configuration they run under.
#[derive(Clone)]
pub struct Engine {
    pub config: Config,
    pub metadata: Arc<dyn MetadataStore>,
    pub content: Arc<dyn ContentStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

/// What one pass did.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub integrity: Option<IntegrityReport>,
    pub crawl: Option<CrawlReport>,
    pub reconcile: ReconcileStats,
    /// `None` when the crawl did not complete and purge was skipped.
    pub purge: Option<PurgeReport>,
}

impl Engine {
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            metadata,
            content,
            embedder,
        }
    }

    /// Open both SQLite stores (creating them if needed) and the configured
    /// embedding provider.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        migrate::run_migrations(config)
            .await
            .context("Failed to initialize databases")?;
        let (metadata_pool, content_pool) = db::connect(config).await?;
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(create_provider(&config.embedding)?);

        Ok(Self::new(
            config.clone(),
            Arc::new(SqliteMetadataStore::new(metadata_pool)),
            Arc::new(SqliteContentStore::new(
                content_pool,
                config.embedding.effective_dims(),
            )),
            embedder,
        ))
    }

    pub fn integrity_checker(&self) -> IntegrityChecker {
        IntegrityChecker::new(
            self.metadata.clone(),
            self.content.clone(),
            self.embedder.clone(),
            self.config.integrity.clone(),
        )
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.metadata.clone(),
            self.content.clone(),
            self.embedder.clone(),
            self.config.chunking.clone(),
            self.config.embedding.effective_dims(),
        )
    }

    /// Run one full pass. Returns [`IndexError::Cancelled`] if `cancel`
    /// fires before the pass finishes.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        let mut summary = PassSummary::default();

        match self.integrity_checker().check(false).await {
            Ok(report) => summary.integrity = Some(report),
            Err(e) => warn!(error = %e, "integrity check failed, continuing with pass"),
        }

        let crawler = Crawler::from_config(&self.config.index)
            .map_err(|e| IndexError::CrawlEntry {
                path: self.config.index.root.clone(),
                message: e.to_string(),
            })?;

        let (tx, rx) = work_queue();
        let reconciler = self.reconciler();
        let reconcile_cancel = cancel.child_token();
        let reconcile = tokio::spawn(async move { reconciler.run(rx, reconcile_cancel).await });

        let crawl_cancel = cancel.clone();
        let crawl = tokio::task::spawn_blocking(move || crawler.crawl(&tx, &crawl_cancel))
            .await
            .map_err(|e| IndexError::CrawlEntry {
                path: self.config.index.root.clone(),
                message: format!("crawl task failed: {}", e),
            })
            .and_then(|r| r);

        summary.reconcile = reconcile.await.unwrap_or_else(|e| {
            warn!(error = %e, "reconcile task failed");
            ReconcileStats::default()
        });

        if cancel.is_cancelled() {
            info!("pass cancelled");
            return Err(IndexError::Cancelled);
        }

        match crawl {
            Ok(report) => {
                match purge_after_crawl(&report, self.metadata.as_ref(), self.content.as_ref())
                    .await
                {
                    Ok(purged) => summary.purge = Some(purged),
                    Err(e) => warn!(error = %e, "purge failed, will retry next pass"),
                }
                summary.crawl = Some(report);
            }
            Err(e) => warn!(error = %e, "crawl did not complete, purge skipped"),
        }

        info!(
            indexed = summary.reconcile.indexed,
            reindexed = summary.reconcile.reindexed,
            failed = summary.reconcile.failed,
            purged = summary.purge.as_ref().map(|p| p.removed_paths.len()).unwrap_or(0),
            "pass finished"
        );
        Ok(summary)
    }
}

/// Keep the index in sync until `cancel` fires.
///
/// Runs a pass immediately when `start_indexing` is set, then one every
/// `rescan_interval_secs`. With an interval of 0 it returns after the first
/// pass.
pub async fn run_service(engine: Arc<Engine>, cancel: CancellationToken) {
    let interval = engine.config.index.rescan_interval_secs;
    let mut run_now = engine.config.index.start_indexing;

    loop {
        if run_now {
            match engine.run_pass(&cancel).await {
                Ok(_) => {}
                Err(IndexError::Cancelled) => break,
                Err(e) => warn!(error = %e, "indexing pass failed"),
            }
        }
        if interval == 0 {
            break;
        }
        run_now = true;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }
    info!("indexing service stopped");
}

/// `docsync sync`: one pass, summary on stdout.
pub async fn run_sync(config: &Config) -> anyhow::Result<()> {
    let engine = Engine::open(config).await?;
    let cancel = CancellationToken::new();

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = engine.run_pass(&cancel).await;
    ctrl_c.abort();
    let summary = result?;

    println!("sync {}", config.index.root.display());
    if let Some(ref integrity) = summary.integrity {
        if integrity.needs_recovery() {
            println!("  integrity: cleared {} records", integrity.cleared);
        }
    }
    match summary.crawl {
        Some(ref crawl) => {
            println!("  discovered: {}", crawl.enqueued);
            println!("  skipped extensions: {}", crawl.skipped);
            if !crawl.unreadable.is_empty() {
                println!("  unreadable: {}", crawl.unreadable.len());
            }
        }
        None => println!("  crawl: incomplete"),
    }
    let stats = &summary.reconcile;
    println!("  current: {}", stats.current);
    println!("  indexed: {}", stats.indexed);
    println!("  reindexed: {}", stats.reindexed);
    println!("  unsupported: {}", stats.unsupported);
    println!("  failed: {}", stats.failed);
    println!("  chunks written: {}", stats.chunks_written);
    match summary.purge {
        Some(ref purge) => println!("  purged: {}", purge.removed_paths.len()),
        None => println!("  purged: skipped"),
    }
    println!("ok");
    Ok(())
}

/// `docsync check`: run the integrity checker and print the report.
pub async fn run_check(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    let engine = Engine::open(config).await?;
    let report = engine.integrity_checker().check(dry_run).await?;
    print!("{}", report);
    Ok(())
}
