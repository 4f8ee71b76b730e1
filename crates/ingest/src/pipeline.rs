//! Per-stream ingestion loop: fetch, normalize, enqueue, pace.
//!
//! A [`StreamPipeline`] owns the producer side of its stream's bounded queue.
//! The consumer side ([`StreamQueue`]) is handed to whoever drains it. When
//! ingestion ends the producer is dropped, so the consumer sees the queue
//! close once it has drained what is buffered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use umbrella_core::{StreamConfig, StreamKind};

use crate::normalizer::normalize;
use crate::queue::{bounded, QueueProducer, StreamQueue};
use crate::source::{RecordSource, SourceError};

/// Why an ingestion loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    Shutdown,
    SourceExhausted,
    QueueClosed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: u64,
    pub pushed: u64,
    pub warnings: u64,
    pub fetch_errors: u64,
    pub stop: StopReason,
}

pub struct StreamPipeline {
    kind: StreamKind,
    source: Arc<dyn RecordSource>,
    producer: QueueProducer,
    pacing: Duration,
    span: Span,
}

impl StreamPipeline {
    pub fn new(
        kind: StreamKind,
        source: Arc<dyn RecordSource>,
        config: &StreamConfig,
    ) -> (Self, StreamQueue) {
        let (producer, queue) = bounded(config.queue_capacity);
        let span = info_span!("stream", kind = %kind, source = %source.name());
        let pipeline = Self {
            kind,
            source,
            producer,
            pacing: config.pacing,
            span,
        };
        (pipeline, queue)
    }

    /// Replace the default `stream` span all ingestion logs are emitted in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run until shutdown is signalled, the source is exhausted, or the
    /// queue's consumer is gone.
    ///
    /// Waiting on the source and on pacing is abandoned when `shutdown`
    /// flips to `true`. A push that has started is always completed, so a
    /// fetched record is never lost between fetch and queue.
    pub async fn ingest(self, shutdown: watch::Receiver<bool>) -> IngestSummary {
        let span = self.span.clone();
        self.run(shutdown).instrument(span).await
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> IngestSummary {
        let mut summary = IngestSummary::default();
        info!(
            capacity = self.producer.capacity(),
            pacing_ms = self.pacing.as_millis() as u64,
            "ingestion started"
        );

        summary.stop = loop {
            if *shutdown.borrow_and_update() {
                break StopReason::Shutdown;
            }

            let fetched = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break StopReason::Shutdown,
                fetched = self.source.fetch_next() => fetched,
            };

            let raw = match fetched {
                Ok(raw) => raw,
                Err(SourceError::Exhausted) => break StopReason::SourceExhausted,
                Err(e) => {
                    summary.fetch_errors += 1;
                    warn!(error = %e, "fetch failed");
                    if self.pause(&mut shutdown).await {
                        break StopReason::Shutdown;
                    }
                    continue;
                }
            };
            summary.fetched += 1;
            debug!(fields = raw.len(), "raw record received");

            let normalized = normalize(&raw, self.kind);
            normalized.log_warnings();
            summary.warnings += normalized.warnings.len() as u64;

            let sample_id = normalized.record.sample_id.clone();
            if let Err(closed) = self.producer.push(normalized.record).await {
                warn!(sample_id = %closed.0.sample_id, "queue consumer gone, stopping");
                break StopReason::QueueClosed;
            }
            summary.pushed += 1;
            info!(sample_id = %sample_id, depth = self.producer.len(), "record queued");

            if self.pause(&mut shutdown).await {
                break StopReason::Shutdown;
            }
        };

        info!(
            fetched = summary.fetched,
            pushed = summary.pushed,
            warnings = summary.warnings,
            fetch_errors = summary.fetch_errors,
            reason = ?summary.stop,
            "ingestion stopped"
        );
        summary
    }

    /// Sleep for the pacing interval. Returns `true` if shutdown arrived first.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if self.pacing.is_zero() {
            tokio::task::yield_now().await;
            return *shutdown.borrow();
        }
        tokio::select! {
            biased;
            _ = stop_requested(shutdown) => true,
            _ = tokio::time::sleep(self.pacing) => false,
        }
    }
}

/// Resolves once the flag reads `true`. A dropped sender can never signal,
/// so that case just stays pending.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
