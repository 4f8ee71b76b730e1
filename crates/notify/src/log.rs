//! Alerts written to the process log. The default channel.

use umbrella_core::AlertEvent;

use crate::traits::{Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

/// `key=value` pairs in key order.
fn render_payload(alert: &AlertEvent) -> String {
    alert
        .payload
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        tracing::warn!(
            alert_id = %alert.id,
            sample_id = %alert.sample_id,
            stream = %alert.stream_kind,
            "[ALERT] {} sample={} {}",
            alert.message,
            alert.sample_id,
            render_payload(alert)
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
