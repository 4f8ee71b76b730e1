use umbrella_core::{AnalysisResult, NormalizedRecord, RecordPayload, StreamKind};

use crate::analyzer::Analyzer;
use crate::error::AnalysisError;

pub const NORMAL_TEMPERATURE: (f64, f64) = (35.0, 38.0);
pub const NORMAL_PRESSURE: (f64, f64) = (98.0, 105.0);

pub struct PhysicalAnalyzer;

fn outside((low, high): (f64, f64), value: f64) -> bool {
    value < low || value > high
}

impl Analyzer for PhysicalAnalyzer {
    fn name(&self) -> &str {
        "physical"
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Physical
    }

    fn analyze(&self, record: &NormalizedRecord) -> Result<AnalysisResult, AnalysisError> {
        let RecordPayload::Physical(fields) = &record.payload else {
            return Err(super::mismatch(StreamKind::Physical, record));
        };
        let temperature = fields
            .temperature
            .ok_or(AnalysisError::MissingField("temperature"))?;
        let pressure = fields.pressure.ok_or(AnalysisError::MissingField("pressure"))?;

        Ok(AnalysisResult::builder(record.sample_id.clone(), StreamKind::Physical)
            .metric("temperature", temperature)
            .metric("pressure", pressure)
            .flag("temperature_alert", outside(NORMAL_TEMPERATURE, temperature))
            .flag("pressure_alert", outside(NORMAL_PRESSURE, pressure))
            .build())
    }
}
