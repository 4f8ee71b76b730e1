use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use umbrella_core::{RawRecord, StreamKind};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source has nothing more to give. Ends ingestion for the stream.
    #[error("source exhausted")]
    Exhausted,

    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Where a stream's raw records come from.
///
/// `fetch_next` may suspend for as long as it needs; the pipeline races it
/// against shutdown. Retrying is the source's own business.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_next(&self) -> Result<RawRecord, SourceError>;

    /// Label used in logs.
    fn name(&self) -> &str;
}

/// Emits the fixed demo sample for its stream kind, forever.
pub struct SimulatedSource {
    kind: StreamKind,
    name: String,
    latency: Duration,
}

impl SimulatedSource {
    pub fn new(kind: StreamKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            latency: Duration::ZERO,
        }
    }

    /// Simulated network latency added to every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn sample(kind: StreamKind) -> RawRecord {
        let value = match kind {
            StreamKind::Genetic => json!({
                "sample_id": "G123",
                "sequence": "ATCGTTAG",
                "quality": 0.98,
            }),
            StreamKind::Biochemical => json!({
                "sample_id": "B456",
                "ph": 7.4,
                "enzyme_activity": 120.5,
            }),
            StreamKind::Physical => json!({
                "sample_id": "F789",
                "temperature": 36.7,
                "pressure": 101.3,
            }),
        };
        RawRecord::from_json(value)
    }
}

#[async_trait]
impl RecordSource for SimulatedSource {
    async fn fetch_next(&self) -> Result<RawRecord, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Self::sample(self.kind))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Replays a fixed list of records once, then reports `Exhausted`.
pub struct ReplaySource {
    name: String,
    records: Mutex<VecDeque<RawRecord>>,
    fetches: AtomicUsize,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(records.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch_next` calls so far, including the exhausted ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl RecordSource for ReplaySource {
    async fn fetch_next(&self) -> Result<RawRecord, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = match self.records.lock() {
            Ok(mut records) => records.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.ok_or(SourceError::Exhausted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fed from the outside through an mpsc sender. Dropping every sender
/// exhausts the source.
pub struct ChannelSource {
    name: String,
    rx: tokio::sync::Mutex<mpsc::Receiver<RawRecord>>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Sender<RawRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            name: name.into(),
            rx: tokio::sync::Mutex::new(rx),
        };
        (source, tx)
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn fetch_next(&self) -> Result<RawRecord, SourceError> {
        self.rx.lock().await.recv().await.ok_or(SourceError::Exhausted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
