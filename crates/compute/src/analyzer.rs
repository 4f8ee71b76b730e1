use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use umbrella_core::{AnalysisResult, NormalizedRecord, StreamKind};

use crate::algorithms::{BiochemicalAnalyzer, GeneticAnalyzer, PhysicalAnalyzer};
use crate::error::AnalysisError;

/// Per-kind analysis routine run on the worker pool.
///
/// Implementations must be pure: no I/O, deterministic for the same input.
pub trait Analyzer: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// The stream kind this analyzer accepts.
    fn kind(&self) -> StreamKind;

    fn analyze(&self, record: &NormalizedRecord) -> Result<AnalysisResult, AnalysisError>;
}

/// Maps each stream kind to the analyzer that handles it.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<StreamKind, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in genetic, biochemical and physical analyzers.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GeneticAnalyzer));
        registry.register(Arc::new(BiochemicalAnalyzer));
        registry.register(Arc::new(PhysicalAnalyzer));
        registry
    }

    /// Register an analyzer for its kind, returning the one it replaced.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Option<Arc<dyn Analyzer>> {
        info!(analyzer = analyzer.name(), kind = %analyzer.kind(), "registered analyzer");
        self.analyzers.insert(analyzer.kind(), analyzer)
    }

    pub fn get(&self, kind: StreamKind) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: StreamKind) -> bool {
        self.analyzers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}
