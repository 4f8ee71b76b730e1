use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::StreamKind;

/// A named value produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Flag(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    Failed { reason: String },
}

/// Output of one analysis call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    sample_id: String,
    stream_kind: StreamKind,
    metrics: BTreeMap<String, MetricValue>,
    alert_flags: BTreeMap<String, bool>,
    status: AnalysisStatus,
}

impl AnalysisResult {
    /// Start building a successful result.
    pub fn builder(sample_id: impl Into<String>, stream_kind: StreamKind) -> AnalysisResultBuilder {
        AnalysisResultBuilder {
            sample_id: sample_id.into(),
            stream_kind,
            metrics: BTreeMap::new(),
            alert_flags: BTreeMap::new(),
        }
    }

    /// A result standing in for an analysis call that did not complete.
    pub fn failed(
        sample_id: impl Into<String>,
        stream_kind: StreamKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            stream_kind,
            metrics: BTreeMap::new(),
            alert_flags: BTreeMap::new(),
            status: AnalysisStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn stream_kind(&self) -> StreamKind {
        self.stream_kind
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricValue> {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn alert_flags(&self) -> &BTreeMap<String, bool> {
        &self.alert_flags
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.alert_flags.get(name).copied()
    }

    /// Names of flags that are raised.
    pub fn raised_flags(&self) -> impl Iterator<Item = &str> {
        self.alert_flags
            .iter()
            .filter(|(_, raised)| **raised)
            .map(|(name, _)| name.as_str())
    }

    pub fn any_flag_raised(&self) -> bool {
        self.alert_flags.values().any(|raised| *raised)
    }

    pub fn status(&self) -> &AnalysisStatus {
        &self.status
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, AnalysisStatus::Failed { .. })
    }
}

pub struct AnalysisResultBuilder {
    sample_id: String,
    stream_kind: StreamKind,
    metrics: BTreeMap<String, MetricValue>,
    alert_flags: BTreeMap<String, bool>,
}

impl AnalysisResultBuilder {
    pub fn metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn flag(mut self, name: impl Into<String>, raised: bool) -> Self {
        self.alert_flags.insert(name.into(), raised);
        self
    }

    pub fn build(self) -> AnalysisResult {
        AnalysisResult {
            sample_id: self.sample_id,
            stream_kind: self.stream_kind,
            metrics: self.metrics,
            alert_flags: self.alert_flags,
            status: AnalysisStatus::Completed,
        }
    }
}
