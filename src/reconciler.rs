//! Reconciler: brings the content store in line with one discovered file.
//!
//! For each [`DiscoveryRecord`] taken off the queue:
//!
//! 1. classify it against the metadata store ([`IndexingStatus`]);
//! 2. `current` → nothing to do;
//! 3. `new` / `stale` → load, split and embed the file on the blocking pool,
//!    then delete any chunks the path still owns, insert the new batch, and
//!    only after the insert succeeds write the metadata record.
//!
//! A failure at any step leaves the metadata record as it was, so the file
//! is picked up again on the next pass. Records are processed strictly one
//! at a time: the loop awaits each file before dequeuing the next, so a
//! path never has two writers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexError, Result};
use crate::loader::{self, LoadedFile};
use crate::models::{DiscoveryRecord, IndexingStatus};
use crate::queue::WorkQueueReceiver;
use crate::store::{ContentStore, MetadataStore};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Current,
    Indexed {
        status: IndexingStatus,
        chunks: usize,
        replaced: u64,
    },
}

/// Counters for one run of the reconciliation loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub current: u64,
    pub indexed: u64,
    pub reindexed: u64,
    pub unsupported: u64,
    pub failed: u64,
    pub chunks_written: u64,
}

impl ReconcileStats {
    fn record(&mut self, outcome: &Result<FileOutcome>) {
        match outcome {
            Ok(FileOutcome::Current) => self.current += 1,
            Ok(FileOutcome::Indexed { status, chunks, .. }) => {
                if *status == IndexingStatus::Stale {
                    self.reindexed += 1;
                } else {
                    self.indexed += 1;
                }
                self.chunks_written += *chunks as u64;
            }
            Err(IndexError::UnsupportedFormat { .. }) => self.unsupported += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn processed(&self) -> u64 {
        self.current + self.indexed + self.reindexed + self.unsupported + self.failed
    }
}

#[derive(Clone)]
pub struct Reconciler {
    metadata: Arc<dyn MetadataStore>,
    content: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    /// Width every stored vector must have.
    dims: usize,
}

impl Reconciler {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
        dims: usize,
    ) -> Self {
        Self {
            metadata,
            content,
            embedder,
            chunking,
            dims,
        }
    }

    pub async fn classify(&self, record: &DiscoveryRecord) -> Result<IndexingStatus> {
        let stored = self.metadata.get(&record.key()).await?;
        Ok(IndexingStatus::classify(stored, record.last_updated_ns))
    }

    /// Reconcile a single file.
    pub async fn process(&self, record: &DiscoveryRecord) -> Result<FileOutcome> {
        let key = record.key();
        let status = self.classify(record).await?;
        if status == IndexingStatus::Current {
            return Ok(FileOutcome::Current);
        }

        let mut loaded = self.load(record).await?;
        self.embed(&mut loaded).await?;

        // A `new` path can still own chunks after the metadata store was
        // cleared by the integrity checker.
        let replaced = self
            .content
            .delete_by_path(std::slice::from_ref(&key))
            .await?;

        self.content.upsert(&loaded.chunks).await?;
        self.metadata.put(&key, record.last_updated_ns).await?;

        Ok(FileOutcome::Indexed {
            status,
            chunks: loaded.chunks.len(),
            replaced,
        })
    }

    async fn load(&self, record: &DiscoveryRecord) -> Result<LoadedFile> {
        let path = record.path.clone();
        let policy = self.chunking.clone();
        tokio::task::spawn_blocking(move || loader::load_and_split(&path, &policy))
            .await
            .map_err(|e| IndexError::Extract(format!("loader task failed: {}", e)))?
    }

    async fn embed(&self, loaded: &mut LoadedFile) -> Result<()> {
        let texts: Vec<String> = loaded.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != loaded.chunks.len() {
            return Err(IndexError::Embedding(format!(
                "expected {} vectors, got {}",
                loaded.chunks.len(),
                vectors.len()
            )));
        }
        // width must match the store's; checked before any write
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(IndexError::Embedding(format!(
                "provider returned {}-wide vectors, store expects {}",
                bad.len(),
                self.dims
            )));
        }
        for (chunk, vector) in loaded.chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
        Ok(())
    }

    /// Consume the queue until it closes or `cancel` fires.
    ///
    /// A file still in flight when `cancel` fires is abandoned; its metadata
    /// record is untouched, so the next pass redoes it.
    pub async fn run(&self, mut queue: WorkQueueReceiver, cancel: CancellationToken) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        info!("reconcile loop started");

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.dequeue() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(path = %record.path.display(), "shutdown during indexing, file abandoned");
                    break;
                }
                outcome = self.process(&record) => outcome,
            };

            log_outcome(&record, &outcome, queue.size());
            stats.record(&outcome);
        }

        info!(
            processed = stats.processed(),
            indexed = stats.indexed,
            reindexed = stats.reindexed,
            failed = stats.failed,
            "reconcile loop stopped"
        );
        stats
    }
}

fn log_outcome(record: &DiscoveryRecord, outcome: &Result<FileOutcome>, remaining: usize) {
    let path = record.path.display();
    let file_id = record.file_id.as_str();
    match outcome {
        Ok(FileOutcome::Current) => {
            debug!(path = %path, file_id, "file is current, skipped");
        }
        Ok(FileOutcome::Indexed {
            status,
            chunks,
            replaced,
        }) => {
            info!(
                path = %path,
                file_id,
                status = status.as_str(),
                chunks,
                replaced,
                remaining,
                "file indexed"
            );
        }
        Err(e @ IndexError::UnsupportedFormat { .. }) => {
            warn!(path = %path, file_id, error = %e, "no loader for file, will retry next pass");
        }
        Err(e) => {
            warn!(path = %path, file_id, error = %e, "indexing failed, will retry next pass");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::queue::work_queue;
    use crate::store::{InMemoryContentStore, InMemoryMetadataStore};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        metadata: Arc<InMemoryMetadataStore>,
        content: Arc<InMemoryContentStore>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let content = Arc::new(InMemoryContentStore::new());
        let reconciler = Reconciler::new(
            metadata.clone(),
            content.clone(),
            Arc::new(HashProvider::new(32)),
            ChunkingConfig {
                chunk_size: 20,
                chunk_overlap: 0,
            },
            32,
        );
        Fixture {
            metadata,
            content,
            reconciler,
        }
    }

    fn record(path: &Path, ts: i64) -> DiscoveryRecord {
        DiscoveryRecord::new(path.to_path_buf(), ts)
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn new_file_is_indexed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha alpha\n\nbeta beta\n\ngamma gamma").unwrap();
        let f = fixture();

        let outcome = f.reconciler.process(&record(&path, 100)).await.unwrap();
        assert_eq!(
            outcome,
            FileOutcome::Indexed {
                status: IndexingStatus::New,
                chunks: 3,
                replaced: 0
            }
        );
        assert_eq!(f.metadata.get(&key(&path)).await.unwrap(), Some(100));
        let chunks = f.content.chunks_for_path(&key(&path)).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.embedding.len() == 32));
    }

    #[tokio::test]
    async fn current_file_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha").unwrap();
        let f = fixture();

        f.reconciler.process(&record(&path, 100)).await.unwrap();
        let before: Vec<String> = f
            .content
            .chunks_for_path(&key(&path))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();

        let outcome = f.reconciler.process(&record(&path, 100)).await.unwrap();
        assert_eq!(outcome, FileOutcome::Current);

        let after: Vec<String> = f
            .content
            .chunks_for_path(&key(&path))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(before, after);
        assert_eq!(f.metadata.get(&key(&path)).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn stale_file_replaces_old_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "one one one\n\ntwo two two\n\nthree three").unwrap();
        let f = fixture();
        f.reconciler.process(&record(&path, 100)).await.unwrap();
        let old_ids: Vec<String> = f
            .content
            .chunks_for_path(&key(&path))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(old_ids.len(), 3);

        fs::write(&path, "one one one\n\ntwo two two\n\nthree three\n\nfour four").unwrap();
        let outcome = f.reconciler.process(&record(&path, 200)).await.unwrap();
        assert_eq!(
            outcome,
            FileOutcome::Indexed {
                status: IndexingStatus::Stale,
                chunks: 4,
                replaced: 3
            }
        );

        let chunks = f.content.chunks_for_path(&key(&path)).await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| !old_ids.contains(&c.id)));
        assert_eq!(f.metadata.get(&key(&path)).await.unwrap(), Some(200));
    }

    #[tokio::test]
    async fn new_file_replaces_orphaned_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha alpha\n\nbeta beta").unwrap();
        let f = fixture();
        f.reconciler.process(&record(&path, 100)).await.unwrap();

        // metadata reset by recovery; the old chunks are still stored
        f.metadata.clear_all().await.unwrap();
        let outcome = f.reconciler.process(&record(&path, 100)).await.unwrap();
        assert_eq!(
            outcome,
            FileOutcome::Indexed {
                status: IndexingStatus::New,
                chunks: 2,
                replaced: 2
            }
        );
        assert_eq!(f.content.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unsupported_format_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.rtf");
        fs::write(&path, "{\\rtf1}").unwrap();
        let f = fixture();

        let err = f.reconciler.process(&record(&path, 100)).await.unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFormat { .. }));
        assert_eq!(f.metadata.row_count().await.unwrap(), 0);
        assert_eq!(f.content.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_insert_leaves_metadata_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha").unwrap();
        let f = fixture();
        f.reconciler.process(&record(&path, 100)).await.unwrap();

        fs::write(&path, "alpha beta").unwrap();
        f.content.set_fail_upserts(true);
        let err = f.reconciler.process(&record(&path, 200)).await.unwrap_err();
        assert!(matches!(err, IndexError::TransientStore(_)));
        assert_eq!(f.metadata.get(&key(&path)).await.unwrap(), Some(100));

        // next pass sees the file as stale again and succeeds
        f.content.set_fail_upserts(false);
        let outcome = f.reconciler.process(&record(&path, 200)).await.unwrap();
        assert!(matches!(
            outcome,
            FileOutcome::Indexed {
                status: IndexingStatus::Stale,
                ..
            }
        ));
        assert_eq!(f.metadata.get(&key(&path)).await.unwrap(), Some(200));
        assert_eq!(f.content.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_width_vectors_are_rejected_before_any_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha").unwrap();
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let content = Arc::new(InMemoryContentStore::new());
        let reconciler = Reconciler::new(
            metadata.clone(),
            content.clone(),
            Arc::new(HashProvider::new(16)),
            ChunkingConfig {
                chunk_size: 20,
                chunk_overlap: 0,
            },
            32,
        );

        let err = reconciler.process(&record(&path, 100)).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)), "got {:?}", err);
        assert_eq!(metadata.row_count().await.unwrap(), 0);
        assert_eq!(content.count().await.unwrap(), 0);

        // still `new` next time round
        let again = reconciler.process(&record(&path, 100)).await.unwrap_err();
        assert!(matches!(again, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn vanished_file_is_a_failure_not_a_panic() {
        let tmp = TempDir::new().unwrap();
        let f = fixture();
        let err = f
            .reconciler
            .process(&record(&tmp.path().join("gone.txt"), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[tokio::test]
    async fn run_drains_queue_and_counts() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.md");
        let bad = tmp.path().join("bad.rtf");
        fs::write(&good, "hello").unwrap();
        fs::write(&bad, "x").unwrap();
        let f = fixture();

        let (tx, rx) = work_queue();
        tx.enqueue(record(&good, 1)).unwrap();
        tx.enqueue(record(&bad, 1)).unwrap();
        tx.enqueue(record(&good, 1)).unwrap();
        drop(tx);

        let stats = f.reconciler.run(rx, CancellationToken::new()).await;
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.unsupported, 1);
        assert_eq!(stats.current, 1);
        assert_eq!(stats.processed(), 3);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let f = fixture();
        let (_tx, rx) = work_queue();
        let cancel = CancellationToken::new();
        let handle = {
            let reconciler = f.reconciler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { reconciler.run(rx, cancel).await })
        };
        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.processed(), 0);
    }
}
