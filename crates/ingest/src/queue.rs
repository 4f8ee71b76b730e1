//! Bounded per-stream hand-off between ingestion and analysis.

use thiserror::Error;
use tokio::sync::mpsc;

use umbrella_core::NormalizedRecord;

/// The consumer side is gone; the record that could not be queued is
/// handed back.
#[derive(Debug, Error)]
#[error("stream queue closed")]
pub struct QueueClosed(pub NormalizedRecord);

/// Create a queue holding at most `capacity` records. Zero is clamped to one.
pub fn bounded(capacity: usize) -> (QueueProducer, StreamQueue) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueProducer { tx, capacity },
        StreamQueue { rx, capacity },
    )
}

#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<NormalizedRecord>,
    capacity: usize,
}

impl QueueProducer {
    /// Suspends while the queue is full.
    pub async fn push(&self, record: NormalizedRecord) -> Result<(), QueueClosed> {
        self.tx
            .send(record)
            .await
            .map_err(|mpsc::error::SendError(record)| QueueClosed(record))
    }

    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct StreamQueue {
    rx: mpsc::Receiver<NormalizedRecord>,
    capacity: usize,
}

impl StreamQueue {
    /// Suspends while the queue is empty. `None` once every producer is gone
    /// and the buffer is drained.
    pub async fn pop(&mut self) -> Option<NormalizedRecord> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
