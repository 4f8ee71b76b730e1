pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use analysis::{AnalysisResult, AnalysisResultBuilder, AnalysisStatus, MetricValue};
pub use config::{
    AlertConfig, Config, EmailConfig, MetricsConfig, ProcessingConfig, StreamConfig,
    StreamsConfig, WebhookConfig,
};
pub use error::{CoreError, Severity, ValidationError};
pub use event::{AlertChannel, AlertEvent, MetricEvent, MetricStatus};
pub use record::{
    BiochemicalFields, GeneticFields, NormalizedRecord, PhysicalFields, RawRecord, RecordPayload,
    StreamKind, UNKNOWN_SAMPLE_ID,
};
