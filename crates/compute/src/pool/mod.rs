//! Fixed-size analysis worker pool.
//!
//! Analysis is CPU-bound, so it runs on a dedicated [`rayon`] thread pool
//! rather than on the async scheduler. Admission goes through a fair tokio
//! [`Semaphore`] holding one permit per worker: callers from every stream
//! queue in FIFO order and at most `size` analyses run at once. Each job hands
//! its outcome back over a oneshot channel, so callers suspend instead of
//! blocking a scheduler thread.

mod metrics;

pub use metrics::PoolMetrics;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use umbrella_core::{AnalysisResult, NormalizedRecord, StreamKind};

use crate::analyzer::AnalyzerRegistry;
use crate::error::AnalysisError;

pub struct AnalysisPool {
    workers: rayon::ThreadPool,
    registry: AnalyzerRegistry,
    permits: Arc<Semaphore>,
    size: usize,
    in_flight: Arc<AtomicUsize>,
    metrics: Arc<RwLock<PoolMetrics>>,
    span: Span,
}

impl AnalysisPool {
    /// Build a pool of `size` worker threads (at least one).
    pub fn new(size: usize, registry: AnalyzerRegistry) -> Result<Self, AnalysisError> {
        let size = size.max(1);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("analysis-{i}"))
            .build()
            .map_err(|e| AnalysisError::PoolBuild(e.to_string()))?;

        info!(size, analyzers = registry.len(), "analysis pool started");
        Ok(Self {
            workers,
            registry,
            permits: Arc::new(Semaphore::new(size)),
            size,
            in_flight: Arc::new(AtomicUsize::new(0)),
            metrics: Arc::new(RwLock::new(PoolMetrics::default())),
            span: info_span!("analysis_pool", size),
        })
    }

    /// Replace the default `analysis_pool` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Analyses currently running on a worker thread.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> PoolMetrics {
        match self.metrics.read() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn completed(&self) -> u64 {
        self.metrics().total_completed()
    }

    pub fn failed(&self) -> u64 {
        self.metrics().total_failed()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Analyze one record, suspending until a worker is free.
    ///
    /// Never fails: analyzer errors, panics and a closed pool all come back
    /// as [`AnalysisResult::failed`] for the record.
    pub async fn submit(&self, kind: StreamKind, record: NormalizedRecord) -> AnalysisResult {
        let sample_id = record.sample_id.clone();
        let started = Instant::now();

        let outcome = self
            .run(kind, record)
            .instrument(self.span.clone())
            .await;

        let elapsed = started.elapsed();
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.span.in_scope(|| {
                    warn!(stream = %kind, sample_id = %sample_id, error = %e, "analysis failed")
                });
                AnalysisResult::failed(sample_id, kind, e.to_string())
            }
        };
        self.record(kind, elapsed, !result.is_failed());
        result
    }

    async fn run(
        &self,
        kind: StreamKind,
        record: NormalizedRecord,
    ) -> Result<AnalysisResult, AnalysisError> {
        let analyzer = self
            .registry
            .get(kind)
            .ok_or(AnalysisError::UnsupportedKind(kind))?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AnalysisError::PoolClosed)?;

        let (tx, rx) = oneshot::channel();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(stream = %kind, sample_id = %record.sample_id, analyzer = analyzer.name(), "dispatching");

        self.workers.spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&record))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(AnalysisError::Panicked(panic_message(payload))),
            };
            in_flight.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
            // The caller may have gone away; nothing to do then.
            let _ = tx.send(outcome);
        });

        rx.await.map_err(|_| AnalysisError::WorkerLost)?
    }

    fn record(&self, kind: StreamKind, duration: Duration, ok: bool) {
        if let Ok(mut m) = self.metrics.write() {
            m.record(kind, duration, ok);
        }
    }

    /// Wait for every outstanding analysis, then refuse new ones.
    ///
    /// Callers already waiting for admission when shutdown starts are served
    /// first; later submissions get a failed result.
    pub async fn shutdown(&self) {
        let _all = match self.permits.acquire_many(self.size as u32).await {
            Ok(permits) => permits,
            Err(_) => return,
        };
        self.permits.close();
        let m = self.metrics();
        self.span.in_scope(|| {
            info!(
                completed = m.total_completed(),
                failed = m.total_failed(),
                "analysis pool shut down"
            )
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
