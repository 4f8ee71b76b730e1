use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::record::StreamKind;

/// Outcome recorded for every routed analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricStatus {
    Ok,
    Alert,
    Error,
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricStatus::Ok => f.write_str("OK"),
            MetricStatus::Alert => f.write_str("ALERT"),
            MetricStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// One entry in the metrics ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub stream_kind: StreamKind,
    pub sample_id: String,
    pub latency: Duration,
    pub status: MetricStatus,
    pub completed_at: DateTime<Utc>,
}

impl MetricEvent {
    pub fn new(
        stream_kind: StreamKind,
        sample_id: impl Into<String>,
        latency: Duration,
        status: MetricStatus,
    ) -> Self {
        Self {
            stream_kind,
            sample_id: sample_id.into(),
            latency,
            status,
            completed_at: Utc::now(),
        }
    }
}

/// Notification payload raised when an analysis result crosses its
/// stream's alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub sample_id: String,
    pub stream_kind: StreamKind,
    #[serde(flatten)]
    pub payload: BTreeMap<String, String>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        sample_id: impl Into<String>,
        stream_kind: StreamKind,
        payload: BTreeMap<String, String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sample_id: sample_id.into(),
            stream_kind,
            payload,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Where alerts are delivered. Chosen once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Log,
    Email,
    Webhook,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Log => "log",
            AlertChannel::Email => "email",
            AlertChannel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertChannel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(AlertChannel::Log),
            "email" => Ok(AlertChannel::Email),
            "webhook" => Ok(AlertChannel::Webhook),
            _ => Err(CoreError::UnsupportedAlertChannel(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_channel_parses_known_values() {
        assert_eq!("log".parse::<AlertChannel>().unwrap(), AlertChannel::Log);
        assert_eq!("Email".parse::<AlertChannel>().unwrap(), AlertChannel::Email);
        assert_eq!("webhook".parse::<AlertChannel>().unwrap(), AlertChannel::Webhook);
    }

    #[test]
    fn alert_channel_rejects_sms() {
        assert_eq!(
            "sms".parse::<AlertChannel>().unwrap_err(),
            CoreError::UnsupportedAlertChannel("sms".to_string())
        );
    }

    #[test]
    fn alert_event_serializes_flat_payload() {
        let payload = BTreeMap::from([
            ("ph".to_string(), "6".to_string()),
            ("anomaly_detected".to_string(), "true".to_string()),
        ]);
        let event = AlertEvent::new(
            "B002",
            StreamKind::Biochemical,
            payload,
            "Biochemical anomaly detected",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sample_id"], "B002");
        assert_eq!(json["stream_kind"], "biochemical");
        assert_eq!(json["ph"], "6");
        assert_eq!(json["message"], "Biochemical anomaly detected");
    }

    #[test]
    fn metric_status_display() {
        assert_eq!(MetricStatus::Ok.to_string(), "OK");
        assert_eq!(MetricStatus::Alert.to_string(), "ALERT");
        assert_eq!(MetricStatus::Error.to_string(), "ERROR");
    }
}
