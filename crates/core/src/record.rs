use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Sample id used when the raw record does not carry one.
pub const UNKNOWN_SAMPLE_ID: &str = "UNKNOWN";

/// The kind of data stream a sample belongs to. Determines field shape and
/// alert predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Genetic,
    Biochemical,
    Physical,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [
        StreamKind::Genetic,
        StreamKind::Biochemical,
        StreamKind::Physical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Genetic => "genetic",
            StreamKind::Biochemical => "biochemical",
            StreamKind::Physical => "physical",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "genetic" => Ok(StreamKind::Genetic),
            "biochemical" => Ok(StreamKind::Biochemical),
            "physical" => Ok(StreamKind::Physical),
            _ => Err(CoreError::UnsupportedStreamKind(s.to_string())),
        }
    }
}

/// Untrusted record as delivered by a source: field name → JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style field insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wrap a JSON value. Non-object values yield an empty record.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneticFields {
    pub sequence: Option<String>,
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiochemicalFields {
    pub ph: Option<f64>,
    pub enzyme_activity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalFields {
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
}

/// Typed fields of a normalized record. `None` marks a field whose raw
/// value could not be coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordPayload {
    Genetic(GeneticFields),
    Biochemical(BiochemicalFields),
    Physical(PhysicalFields),
}

impl RecordPayload {
    pub fn kind(&self) -> StreamKind {
        match self {
            RecordPayload::Genetic(_) => StreamKind::Genetic,
            RecordPayload::Biochemical(_) => StreamKind::Biochemical,
            RecordPayload::Physical(_) => StreamKind::Physical,
        }
    }
}

/// A validated sample ready for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub sample_id: String,
    pub payload: RecordPayload,
}

impl NormalizedRecord {
    pub fn new(sample_id: impl Into<String>, payload: RecordPayload) -> Self {
        Self {
            sample_id: sample_id.into(),
            payload,
        }
    }

    pub fn genetic(sample_id: impl Into<String>, sequence: &str, quality: f64) -> Self {
        Self::new(
            sample_id,
            RecordPayload::Genetic(GeneticFields {
                sequence: Some(sequence.to_string()),
                quality: Some(quality),
            }),
        )
    }

    pub fn biochemical(sample_id: impl Into<String>, ph: f64, enzyme_activity: f64) -> Self {
        Self::new(
            sample_id,
            RecordPayload::Biochemical(BiochemicalFields {
                ph: Some(ph),
                enzyme_activity: Some(enzyme_activity),
            }),
        )
    }

    pub fn physical(sample_id: impl Into<String>, temperature: f64, pressure: f64) -> Self {
        Self::new(
            sample_id,
            RecordPayload::Physical(PhysicalFields {
                temperature: Some(temperature),
                pressure: Some(pressure),
            }),
        )
    }

    pub fn kind(&self) -> StreamKind {
        self.payload.kind()
    }
}
