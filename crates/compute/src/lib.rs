pub mod algorithms;
pub mod analyzer;
pub mod error;
pub mod pool;

pub use algorithms::{BiochemicalAnalyzer, GeneticAnalyzer, PhysicalAnalyzer};
pub use analyzer::{Analyzer, AnalyzerRegistry};
pub use error::AnalysisError;
pub use pool::{AnalysisPool, PoolMetrics};
