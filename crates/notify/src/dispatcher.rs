//! Fire-and-forget alert delivery.
//!
//! The router must never wait on a slow SMTP server or webhook, so alerts are
//! handed to a background task through a bounded queue. [`AlertHandle::dispatch`]
//! only ever `try_send`s: when the queue is full the alert is dropped with a
//! warning and counted. Delivery failures are caught inside [`AlertNotifier`]
//! and never reach the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use umbrella_core::AlertEvent;

use crate::traits::Notifier;

/// Delivery totals reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    /// Alerts rejected because the queue was full or already closed.
    pub dropped: u64,
}

/// Wraps the configured channel and swallows its failures.
pub struct AlertNotifier {
    channel: Box<dyn Notifier>,
    delivered: AtomicU64,
    failed: AtomicU64,
    span: Span,
}

impl AlertNotifier {
    pub fn new(channel: Box<dyn Notifier>) -> Self {
        let span = info_span!("alerts", channel = channel.channel_name());
        Self {
            channel,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn channel_name(&self) -> &str {
        self.channel.channel_name()
    }

    /// Deliver one alert. Failures are logged and counted, never returned.
    pub async fn notify(&self, alert: &AlertEvent) {
        let start = Instant::now();
        let result = self.channel.send(alert).instrument(self.span.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.span.in_scope(|| match result {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(sample_id = %alert.sample_id, duration_ms, "alert delivered");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sample_id = %alert.sample_id,
                    error = %e,
                    duration_ms,
                    "alert delivery failed"
                );
            }
        });
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cheap, cloneable sender side given to routers.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<AlertEvent>,
    dropped: Arc<AtomicU64>,
}

impl AlertHandle {
    /// Queue an alert without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, alert: AlertEvent) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(sample_id = %alert.sample_id, "alert queue full, dropping alert");
                false
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(sample_id = %alert.sample_id, "alert queue closed, dropping alert");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Background delivery task plus the queue feeding it.
pub struct AlertDispatcher {
    handle: AlertHandle,
    close: oneshot::Sender<()>,
    task: JoinHandle<AlertNotifier>,
}

impl AlertDispatcher {
    /// Spawn the delivery task on the current runtime.
    pub fn spawn(channel: Box<dyn Notifier>, capacity: usize) -> Self {
        Self::spawn_notifier(AlertNotifier::new(channel), capacity)
    }

    pub fn spawn_notifier(notifier: AlertNotifier, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (close, closed) = oneshot::channel();
        info!(channel = notifier.channel_name(), capacity, "alert dispatcher started");
        let task = tokio::spawn(deliver(notifier, rx, closed));
        Self {
            handle: AlertHandle {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            close,
            task,
        }
    }

    pub fn handle(&self) -> AlertHandle {
        self.handle.clone()
    }

    /// Close the queue, deliver everything already in it, and report.
    pub async fn shutdown(self) -> DeliveryStats {
        let dropped = self.handle.dropped.clone();
        drop(self.handle);
        let _ = self.close.send(());

        let (delivered, failed) = match self.task.await {
            Ok(notifier) => (notifier.delivered(), notifier.failed()),
            Err(e) => {
                warn!(error = %e, "alert delivery task ended abnormally");
                (0, 0)
            }
        };
        let stats = DeliveryStats {
            delivered,
            failed,
            dropped: dropped.load(Ordering::Relaxed),
        };
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "alert dispatcher stopped"
        );
        stats
    }
}

async fn deliver(
    notifier: AlertNotifier,
    mut rx: mpsc::Receiver<AlertEvent>,
    mut closed: oneshot::Receiver<()>,
) -> AlertNotifier {
    loop {
        tokio::select! {
            biased;
            Some(alert) = rx.recv() => notifier.notify(&alert).await,
            _ = &mut closed => break,
        }
    }

    rx.close();
    while let Some(alert) = rx.recv().await {
        notifier.notify(&alert).await;
    }
    notifier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NotifyError;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;
    use umbrella_core::StreamKind;

    struct MockNotifier {
        send_count: Arc<AtomicUsize>,
        fail_sample: Option<&'static str>,
        gate: Option<Arc<Notify>>,
    }

    impl MockNotifier {
        fn counting(send_count: Arc<AtomicUsize>) -> Self {
            Self {
                send_count,
                fail_sample: None,
                gate: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_sample == Some(alert.sample_id.as_str()) {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    fn alert(sample_id: &str) -> AlertEvent {
        AlertEvent::new(sample_id, StreamKind::Physical, BTreeMap::new(), "test alert")
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_deliveries() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = AlertNotifier::new(Box::new(MockNotifier {
            send_count: count.clone(),
            fail_sample: Some("bad"),
            gate: None,
        }));

        notifier.notify(&alert("bad")).await;
        notifier.notify(&alert("good")).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.failed(), 1);
        assert_eq!(notifier.delivered(), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_alerts() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            AlertDispatcher::spawn(Box::new(MockNotifier::counting(count.clone())), 16);
        let handle = dispatcher.handle();

        for i in 0..5 {
            assert!(handle.dispatch(alert(&format!("F{i}"))));
        }
        let stats = dispatcher.shutdown().await;

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(
            stats,
            DeliveryStats {
                delivered: 5,
                failed: 0,
                dropped: 0
            }
        );
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let count = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let dispatcher = AlertDispatcher::spawn(
            Box::new(MockNotifier {
                send_count: count.clone(),
                fail_sample: None,
                gate: Some(gate.clone()),
            }),
            1,
        );
        let handle = dispatcher.handle();

        // First alert is taken by the task and parks on the gate.
        assert!(handle.dispatch(alert("F0")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Second fills the queue, third is dropped.
        assert!(handle.dispatch(alert("F1")));
        assert!(!handle.dispatch(alert("F2")));
        assert_eq!(handle.dropped(), 1);

        let release = tokio::spawn({
            let gate = gate.clone();
            async move {
                loop {
                    gate.notify_one();
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        });
        let stats = dispatcher.shutdown().await;
        release.abort();

        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::spawn(Box::new(MockNotifier::counting(count)), 4);
        let handle = dispatcher.handle();
        dispatcher.shutdown().await;

        assert!(!handle.dispatch(alert("late")));
        assert_eq!(handle.dropped(), 1);
    }
}
