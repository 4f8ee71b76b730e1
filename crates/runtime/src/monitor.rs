//! In-memory metrics ledger.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Span};

use umbrella_core::{MetricEvent, MetricStatus, StreamKind};

/// Per-stream aggregate over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub count: u64,
    pub ok: u64,
    pub alert: u64,
    pub error: u64,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

/// Append-only record of every routed result, in completion order.
///
/// Holds the full run history; nothing is evicted.
pub struct MetricsMonitor {
    events: Mutex<Vec<MetricEvent>>,
    span: Span,
}

impl Default for MetricsMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsMonitor {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            span: info_span!("metrics"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn events(&self) -> MutexGuard<'_, Vec<MetricEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record(&self, event: MetricEvent) {
        self.span.in_scope(|| {
            debug!(
                stream = %event.stream_kind,
                sample_id = %event.sample_id,
                status = %event.status,
                latency_ms = event.latency.as_millis() as u64,
                "metric recorded"
            )
        });
        self.events().push(event);
    }

    pub fn snapshot(&self) -> Vec<MetricEvent> {
        self.events().clone()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    pub fn count(&self, kind: StreamKind, status: MetricStatus) -> usize {
        self.events()
            .iter()
            .filter(|e| e.stream_kind == kind && e.status == status)
            .count()
    }

    pub fn summary(&self) -> BTreeMap<StreamKind, StreamStats> {
        let events = self.events();
        let mut totals: BTreeMap<StreamKind, (StreamStats, Duration)> = BTreeMap::new();

        for event in events.iter() {
            let (stats, latency_sum) = totals.entry(event.stream_kind).or_default();
            stats.count += 1;
            match event.status {
                MetricStatus::Ok => stats.ok += 1,
                MetricStatus::Alert => stats.alert += 1,
                MetricStatus::Error => stats.error += 1,
            }
            *latency_sum += event.latency;
            stats.max_latency = stats.max_latency.max(event.latency);
        }

        totals
            .into_iter()
            .map(|(kind, (mut stats, latency_sum))| {
                stats.mean_latency = latency_sum / stats.count as u32;
                (kind, stats)
            })
            .collect()
    }

    /// One info line per stream.
    pub fn log_summary(&self) {
        let summary = self.summary();
        let _enter = self.span.enter();
        if summary.is_empty() {
            info!("no results recorded yet");
        }
        for (kind, s) in summary {
            info!(
                stream = %kind,
                count = s.count,
                ok = s.ok,
                alert = s.alert,
                error = s.error,
                mean_latency_ms = s.mean_latency.as_millis() as u64,
                max_latency_ms = s.max_latency.as_millis() as u64,
                "stream summary"
            );
        }
    }
}

/// Log the summary every `every` until `shutdown` reads `true`.
pub async fn report_periodically(
    monitor: Arc<MetricsMonitor>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; nothing to report yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => monitor.log_summary(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
