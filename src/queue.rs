//! In-memory work queue between the crawler and the reconciler.
//!
//! An unbounded tokio channel: [`WorkQueueSender::enqueue`] never blocks and
//! never drops a record while the consumer is alive, and
//! [`WorkQueueReceiver::dequeue`] suspends until a record arrives. Records
//! come out in FIFO order. Nothing is persisted; records lost in a crash are
//! rediscovered by the next crawl pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{IndexError, Result};
use crate::models::DiscoveryRecord;

/// Create a connected producer/consumer pair.
pub fn work_queue() -> (WorkQueueSender, WorkQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        WorkQueueSender {
            tx,
            depth: depth.clone(),
        },
        WorkQueueReceiver { rx, depth },
    )
}

/// Producer half. Cloneable; the queue closes when every clone is dropped.
#[derive(Clone)]
pub struct WorkQueueSender {
    tx: mpsc::UnboundedSender<DiscoveryRecord>,
    depth: Arc<AtomicUsize>,
}

impl WorkQueueSender {
    /// Hand a record to the consumer. Fails only when the consumer is gone.
    pub fn enqueue(&self, record: DiscoveryRecord) -> Result<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(record).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(IndexError::Cancelled);
        }
        Ok(())
    }

    /// Best-effort number of records waiting.
    pub fn size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer half.
pub struct WorkQueueReceiver {
    rx: mpsc::UnboundedReceiver<DiscoveryRecord>,
    depth: Arc<AtomicUsize>,
}

impl WorkQueueReceiver {
    /// Wait for the next record. `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn dequeue(&mut self) -> Option<DiscoveryRecord> {
        let record = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(record)
    }

    /// Best-effort number of records waiting.
    pub fn size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
