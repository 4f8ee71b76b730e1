pub mod normalizer;
pub mod pipeline;
pub mod queue;
pub mod source;

pub use normalizer::{normalize, normalize_named, Normalized};
pub use pipeline::{IngestSummary, StopReason, StreamPipeline};
pub use queue::{bounded, QueueClosed, QueueProducer, StreamQueue};
pub use source::{ChannelSource, RecordSource, ReplaySource, SimulatedSource, SourceError};
