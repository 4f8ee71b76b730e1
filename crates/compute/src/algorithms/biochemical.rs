use umbrella_core::{AnalysisResult, NormalizedRecord, RecordPayload, StreamKind};

use crate::analyzer::Analyzer;
use crate::error::AnalysisError;

/// ph band considered normal; anything outside is an anomaly.
pub const NORMAL_PH: (f64, f64) = (7.0, 7.8);

pub struct BiochemicalAnalyzer;

pub fn is_anomalous(ph: f64) -> bool {
    ph < NORMAL_PH.0 || ph > NORMAL_PH.1
}

impl Analyzer for BiochemicalAnalyzer {
    fn name(&self) -> &str {
        "biochemical"
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Biochemical
    }

    fn analyze(&self, record: &NormalizedRecord) -> Result<AnalysisResult, AnalysisError> {
        let RecordPayload::Biochemical(fields) = &record.payload else {
            return Err(super::mismatch(StreamKind::Biochemical, record));
        };
        let ph = fields.ph.ok_or(AnalysisError::MissingField("ph"))?;

        let mut builder = AnalysisResult::builder(record.sample_id.clone(), StreamKind::Biochemical)
            .metric("ph", ph)
            .flag("anomaly_detected", is_anomalous(ph));
        if let Some(activity) = fields.enzyme_activity {
            builder = builder.metric("enzyme_activity", activity);
        }
        Ok(builder.build())
    }
}
