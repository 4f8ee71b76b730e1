//! Genetic sequence scoring.
//!
//! Confidence combines the read quality with how much of the sequence is made
//! of valid nucleotides: `clamp(quality, 0, 1) * valid_fraction`. A clean,
//! high-quality read approaches 1.0; noise in either lowers it.

use umbrella_core::{AnalysisResult, NormalizedRecord, RecordPayload, StreamKind};

use crate::analyzer::Analyzer;
use crate::error::AnalysisError;

/// Marker reported for every genetic sample.
pub const MUTATION_MARKER: &str = "TP53";

pub struct GeneticAnalyzer;

/// Base composition of a nucleotide sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Composition {
    /// Fraction of characters that are A, C, G or T.
    pub valid_fraction: f64,
    /// Fraction of valid bases that are G or C.
    pub gc_content: f64,
}

pub fn composition(sequence: &str) -> Composition {
    let total = sequence.chars().count();
    if total == 0 {
        return Composition {
            valid_fraction: 0.0,
            gc_content: 0.0,
        };
    }

    let (mut valid, mut gc) = (0usize, 0usize);
    for base in sequence.chars() {
        match base.to_ascii_uppercase() {
            'G' | 'C' => {
                valid += 1;
                gc += 1;
            }
            'A' | 'T' => valid += 1,
            _ => {}
        }
    }

    Composition {
        valid_fraction: valid as f64 / total as f64,
        gc_content: if valid == 0 { 0.0 } else { gc as f64 / valid as f64 },
    }
}

/// Read quality scaled by the share of the sequence that is a valid base.
pub fn confidence(quality: f64, stats: &Composition) -> f64 {
    quality.clamp(0.0, 1.0) * stats.valid_fraction
}

impl Analyzer for GeneticAnalyzer {
    fn name(&self) -> &str {
        "genetic"
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Genetic
    }

    fn analyze(&self, record: &NormalizedRecord) -> Result<AnalysisResult, AnalysisError> {
        let RecordPayload::Genetic(fields) = &record.payload else {
            return Err(super::mismatch(StreamKind::Genetic, record));
        };
        let quality = fields.quality.ok_or(AnalysisError::MissingField("quality"))?;
        let sequence = fields.sequence.as_deref().unwrap_or_default();
        let stats = composition(sequence);

        Ok(AnalysisResult::builder(record.sample_id.clone(), StreamKind::Genetic)
            .metric("mutation_detected", MUTATION_MARKER)
            .metric("confidence", confidence(quality, &stats))
            .metric("gc_content", stats.gc_content)
            .metric("sequence_length", sequence.chars().count() as f64)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbrella_core::{GeneticFields, MetricValue};

    #[test]
    fn demo_sample_scores_high() {
        let record = NormalizedRecord::genetic("G123", "ATCGTTAG", 0.98);
        let result = GeneticAnalyzer.analyze(&record).unwrap();
        assert_eq!(result.metric("mutation_detected"), Some(&MetricValue::Text("TP53".into())));
        assert_eq!(result.metric("confidence").and_then(|v| v.as_f64()), Some(0.98));
        assert_eq!(result.metric("sequence_length").and_then(|v| v.as_f64()), Some(8.0));
        assert!(!result.any_flag_raised());
    }

    #[test]
    fn noisy_sequence_lowers_confidence() {
        let c = confidence(1.0, &composition("ACGTNNNN"));
        assert!((c - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_sequence_has_zero_confidence() {
        assert_eq!(confidence(0.99, &composition("")), 0.0);
    }

    #[test]
    fn quality_is_clamped() {
        let stats = composition("ACGT");
        assert_eq!(confidence(1.7, &stats), 1.0);
        assert_eq!(confidence(-0.2, &stats), 0.0);
    }

    #[test]
    fn reported_confidence_matches_helper() {
        let record = NormalizedRecord::genetic("G9", "ACGTNNAC", 1.3);
        let result = GeneticAnalyzer.analyze(&record).unwrap();
        let expected = confidence(1.3, &composition("ACGTNNAC"));
        assert_eq!(result.metric("confidence").and_then(|v| v.as_f64()), Some(expected));
        assert!((expected - 0.75).abs() < 1e-9);
    }

    #[test]
    fn gc_content_counts_valid_bases_only() {
        let stats = composition("GGCCAATTNN");
        assert!((stats.gc_content - 0.5).abs() < 1e-9);
        assert!((stats.valid_fraction - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_quality_is_an_error() {
        let record = NormalizedRecord::new(
            "G0",
            RecordPayload::Genetic(GeneticFields {
                sequence: Some("ACGT".into()),
                quality: None,
            }),
        );
        assert!(matches!(
            GeneticAnalyzer.analyze(&record),
            Err(AnalysisError::MissingField("quality"))
        ));
    }

    #[test]
    fn wrong_payload_is_rejected() {
        let record = NormalizedRecord::physical("F1", 36.0, 100.0);
        assert!(matches!(
            GeneticAnalyzer.analyze(&record),
            Err(AnalysisError::KindMismatch { .. })
        ));
    }
}
