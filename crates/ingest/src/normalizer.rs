//! Raw record → typed record coercion and validation.
//!
//! Normalization never fails for a known stream kind: malformed fields are
//! omitted, out-of-range values are kept, and every problem is returned as a
//! [`ValidationError`] next to the record.

use serde_json::Value;
use tracing::{error, warn};

use umbrella_core::{
    BiochemicalFields, CoreError, GeneticFields, NormalizedRecord, PhysicalFields, RawRecord,
    RecordPayload, Severity, StreamKind, ValidationError, UNKNOWN_SAMPLE_ID,
};

/// Accepted quality range for genetic reads.
pub const QUALITY_RANGE: (f64, f64) = (0.0, 1.0);
/// Approximate physiological ph range.
pub const PH_RANGE: (f64, f64) = (6.5, 8.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (30.0, 40.0);
pub const PRESSURE_RANGE: (f64, f64) = (90.0, 110.0);

/// A normalized record plus every non-fatal problem found on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: NormalizedRecord,
    pub warnings: Vec<ValidationError>,
}

impl Normalized {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Emit one log line per warning at its severity.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            match warning.severity() {
                Severity::Error => error!(
                    stream = %self.record.kind(),
                    sample_id = %self.record.sample_id,
                    field = warning.field(),
                    "{warning}"
                ),
                Severity::Warning => warn!(
                    stream = %self.record.kind(),
                    sample_id = %self.record.sample_id,
                    field = warning.field(),
                    "{warning}"
                ),
            }
        }
    }
}

/// Normalize a raw record of a known stream kind.
pub fn normalize(raw: &RawRecord, kind: StreamKind) -> Normalized {
    let mut warnings = Vec::new();
    let sample_id = sample_id(raw, &mut warnings);

    let payload = match kind {
        StreamKind::Genetic => {
            let sequence = match raw.get("sequence") {
                None => Some(String::new()),
                Some(Value::String(s)) => Some(s.to_uppercase()),
                Some(other) => {
                    warnings.push(ValidationError::Malformed {
                        field: "sequence",
                        reason: format!("expected a string, got {}", json_type(other)),
                    });
                    None
                }
            };
            let quality = coerce_f64(raw, "quality", 0.0, &mut warnings);
            check_range("quality", quality, QUALITY_RANGE, Severity::Error, &mut warnings);
            RecordPayload::Genetic(GeneticFields { sequence, quality })
        }
        StreamKind::Biochemical => {
            let ph = coerce_f64(raw, "ph", 7.0, &mut warnings);
            let enzyme_activity = coerce_f64(raw, "enzyme_activity", 0.0, &mut warnings);
            check_range("ph", ph, PH_RANGE, Severity::Warning, &mut warnings);
            RecordPayload::Biochemical(BiochemicalFields { ph, enzyme_activity })
        }
        StreamKind::Physical => {
            let temperature = coerce_f64(raw, "temperature", 0.0, &mut warnings);
            let pressure = coerce_f64(raw, "pressure", 0.0, &mut warnings);
            check_range("temperature", temperature, TEMPERATURE_RANGE, Severity::Warning, &mut warnings);
            check_range("pressure", pressure, PRESSURE_RANGE, Severity::Warning, &mut warnings);
            RecordPayload::Physical(PhysicalFields { temperature, pressure })
        }
    };

    Normalized {
        record: NormalizedRecord::new(sample_id, payload),
        warnings,
    }
}

/// Normalize using a stream kind given by name.
///
/// Unknown kinds are the only failure.
pub fn normalize_named(raw: &RawRecord, kind: &str) -> Result<Normalized, CoreError> {
    let kind: StreamKind = kind.parse()?;
    Ok(normalize(raw, kind))
}

fn sample_id(raw: &RawRecord, warnings: &mut Vec<ValidationError>) -> String {
    match raw.get("sample_id") {
        None | Some(Value::Null) => UNKNOWN_SAMPLE_ID.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            warnings.push(ValidationError::Malformed {
                field: "sample_id",
                reason: format!("expected a string, got {}", json_type(other)),
            });
            UNKNOWN_SAMPLE_ID.to_string()
        }
    }
}

/// Coerce a field to a finite float. Absent fields take `default`;
/// anything that cannot be coerced is reported and omitted.
fn coerce_f64(
    raw: &RawRecord,
    field: &'static str,
    default: f64,
    warnings: &mut Vec<ValidationError>,
) -> Option<f64> {
    let parsed = match raw.get(field) {
        None => return Some(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("{n} is not representable")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("cannot parse {s:?} as a number")),
        Some(other) => Err(format!("expected a number, got {}", json_type(other))),
    };

    match parsed {
        Ok(v) if v.is_finite() => Some(v),
        Ok(v) => {
            warnings.push(ValidationError::Malformed {
                field,
                reason: format!("{v} is not finite"),
            });
            None
        }
        Err(reason) => {
            warnings.push(ValidationError::Malformed { field, reason });
            None
        }
    }
}

fn check_range(
    field: &'static str,
    value: Option<f64>,
    (min, max): (f64, f64),
    severity: Severity,
    warnings: &mut Vec<ValidationError>,
) {
    if let Some(value) = value {
        if !(min..=max).contains(&value) {
            warnings.push(ValidationError::OutOfRange {
                field,
                value,
                min,
                max,
                severity,
            });
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        RawRecord::from_json(value)
    }

    #[test]
    fn genetic_uppercases_sequence() {
        let out = normalize(
            &raw(json!({"sample_id": "G123", "sequence": "atcgttag", "quality": 0.98})),
            StreamKind::Genetic,
        );
        assert!(out.is_clean());
        assert_eq!(out.record, NormalizedRecord::genetic("G123", "ATCGTTAG", 0.98));
    }

    #[test]
    fn genetic_quality_out_of_range_is_kept_with_error() {
        let out = normalize(
            &raw(json!({"sample_id": "G9", "sequence": "AC", "quality": 1.7})),
            StreamKind::Genetic,
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].severity(), Severity::Error);
        match &out.record.payload {
            RecordPayload::Genetic(fields) => assert_eq!(fields.quality, Some(1.7)),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let out = normalize(
            &raw(json!({"sample_id": "B1", "ph": " 7.2 ", "enzyme_activity": "88"})),
            StreamKind::Biochemical,
        );
        assert!(out.is_clean());
        assert_eq!(out.record, NormalizedRecord::biochemical("B1", 7.2, 88.0));
    }

    #[test]
    fn malformed_number_is_omitted_not_raised() {
        let out = normalize(
            &raw(json!({"sample_id": "F3", "temperature": "hot", "pressure": 101.0})),
            StreamKind::Physical,
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field(), "temperature");
        match &out.record.payload {
            RecordPayload::Physical(fields) => {
                assert_eq!(fields.temperature, None);
                assert_eq!(fields.pressure, Some(101.0));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn missing_sample_id_falls_back_to_unknown() {
        let out = normalize(&raw(json!({"ph": 7.4})), StreamKind::Biochemical);
        assert_eq!(out.record.sample_id, UNKNOWN_SAMPLE_ID);
    }

    #[test]
    fn numeric_sample_id_is_rendered() {
        let out = normalize(&raw(json!({"sample_id": 42, "ph": 7.4})), StreamKind::Biochemical);
        assert_eq!(out.record.sample_id, "42");
    }

    #[test]
    fn absent_fields_take_defaults() {
        let out = normalize(&raw(json!({"sample_id": "B0"})), StreamKind::Biochemical);
        assert!(out.is_clean());
        assert_eq!(out.record, NormalizedRecord::biochemical("B0", 7.0, 0.0));
    }

    #[test]
    fn all_problems_are_collected() {
        let out = normalize(
            &raw(json!({"sample_id": ["x"], "temperature": 45.0, "pressure": 80.0})),
            StreamKind::Physical,
        );
        let fields: Vec<_> = out.warnings.iter().map(|w| w.field()).collect();
        assert_eq!(fields, vec!["sample_id", "temperature", "pressure"]);
        assert_eq!(out.record.sample_id, UNKNOWN_SAMPLE_ID);
    }

    #[test]
    fn ph_out_of_range_is_soft_warning() {
        let out = normalize(
            &raw(json!({"sample_id": "B002", "ph": 6.0, "enzyme_activity": 100.0})),
            StreamKind::Biochemical,
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].severity(), Severity::Warning);
        assert_eq!(out.record, NormalizedRecord::biochemical("B002", 6.0, 100.0));
    }

    #[test]
    fn normalize_is_total_for_hostile_input() {
        let inputs = [
            json!({}),
            json!({"sample_id": null, "sequence": 12, "quality": {"a": 1}}),
            json!({"sample_id": true, "ph": [7.0], "enzyme_activity": false}),
            json!({"temperature": "NaN", "pressure": "inf"}),
            json!({"sample_id": "", "quality": ""}),
        ];
        for input in inputs {
            for kind in StreamKind::ALL {
                let out = normalize(&raw(input.clone()), kind);
                assert!(!out.record.sample_id.is_empty() || input["sample_id"] == json!(""));
                assert_eq!(out.record.kind(), kind);
            }
        }
    }

    #[test]
    fn non_finite_strings_are_malformed() {
        let out = normalize(
            &raw(json!({"sample_id": "F", "temperature": "NaN", "pressure": 100.0})),
            StreamKind::Physical,
        );
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].to_string().contains("not finite"));
    }

    #[test]
    fn unknown_kind_name_is_rejected() {
        let err = normalize_named(&raw(json!({"sample_id": "X"})), "radiological").unwrap_err();
        assert_eq!(err, CoreError::UnsupportedStreamKind("radiological".to_string()));
    }

    #[test]
    fn known_kind_name_normalizes() {
        let out = normalize_named(
            &raw(json!({"sample_id": "F001", "temperature": 36.5, "pressure": 101.0})),
            "physical",
        )
        .unwrap();
        assert_eq!(out.record, NormalizedRecord::physical("F001", 36.5, 101.0));
    }
}
