//! Built-in per-kind analyzers.

pub mod biochemical;
pub mod genetic;
pub mod physical;

pub use biochemical::BiochemicalAnalyzer;
pub use genetic::GeneticAnalyzer;
pub use physical::PhysicalAnalyzer;

use umbrella_core::{NormalizedRecord, StreamKind};

use crate::error::AnalysisError;

fn mismatch(expected: StreamKind, record: &NormalizedRecord) -> AnalysisError {
    AnalysisError::KindMismatch {
        expected,
        actual: record.kind(),
    }
}
