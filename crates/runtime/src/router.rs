//! Classifies analysis results, records metrics, and raises alerts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn, Span};

use umbrella_core::{AlertEvent, AnalysisResult, AnalysisStatus, MetricEvent, MetricStatus, StreamKind};
use umbrella_notify::AlertHandle;

use crate::monitor::MetricsMonitor;

/// Outcome of routing one result. Identical to the status recorded in the ledger.
pub type RouteStatus = MetricStatus;

/// Alert message for each stream kind.
pub fn alert_message(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Genetic => "Critical mutation detected",
        StreamKind::Biochemical => "Biochemical anomaly detected",
        StreamKind::Physical => "Physical parameters out of range",
    }
}

/// Decide the route for a result. Genetic confidence must be strictly above
/// `threshold`; any raised flag alerts for every kind.
pub fn classify(result: &AnalysisResult, threshold: f64) -> RouteStatus {
    if result.is_failed() {
        return MetricStatus::Error;
    }
    let critical_confidence = result.stream_kind() == StreamKind::Genetic
        && result
            .metric("confidence")
            .and_then(|v| v.as_f64())
            .is_some_and(|c| c > threshold);

    if critical_confidence || result.any_flag_raised() {
        MetricStatus::Alert
    } else {
        MetricStatus::Ok
    }
}

/// Alert payload: every metric as text plus every raised flag as `"true"`.
pub fn alert_payload(result: &AnalysisResult) -> BTreeMap<String, String> {
    let mut payload: BTreeMap<String, String> = result
        .metrics()
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect();
    for flag in result.raised_flags() {
        payload.insert(flag.to_string(), "true".to_string());
    }
    payload
}

pub struct ResultRouter {
    threshold: f64,
    monitor: Arc<MetricsMonitor>,
    alerts: AlertHandle,
    span: Span,
}

impl ResultRouter {
    pub fn new(threshold: f64, monitor: Arc<MetricsMonitor>, alerts: AlertHandle) -> Self {
        Self {
            threshold,
            monitor,
            alerts,
            span: info_span!("router", threshold),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Route one result. Records exactly one metric event and, for alerts,
    /// queues exactly one alert without waiting for delivery.
    pub fn route(&self, result: &AnalysisResult, latency: Duration) -> RouteStatus {
        let _enter = self.span.enter();
        let kind = result.stream_kind();
        let status = classify(result, self.threshold);

        match status {
            MetricStatus::Alert => {
                let alert = AlertEvent::new(
                    result.sample_id(),
                    kind,
                    alert_payload(result),
                    alert_message(kind),
                );
                warn!(
                    stream = %kind,
                    sample_id = %result.sample_id(),
                    alert_id = %alert.id,
                    "{}",
                    alert.message
                );
                self.alerts.dispatch(alert);
            }
            MetricStatus::Ok => {
                info!(stream = %kind, sample_id = %result.sample_id(), "result ok");
            }
            MetricStatus::Error => {
                let reason = match result.status() {
                    AnalysisStatus::Failed { reason } => reason.as_str(),
                    AnalysisStatus::Completed => "",
                };
                warn!(stream = %kind, sample_id = %result.sample_id(), reason, "analysis error");
            }
        }

        self.monitor
            .record(MetricEvent::new(kind, result.sample_id(), latency, status));
        status
    }
}
