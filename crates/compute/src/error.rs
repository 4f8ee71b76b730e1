use thiserror::Error;

use umbrella_core::StreamKind;

/// Everything that can go wrong between submitting a record and getting a
/// result back. Surfaced as a failed [`AnalysisResult`](umbrella_core::AnalysisResult),
/// never as a crash.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("{expected} analyzer received a {actual} record")]
    KindMismatch {
        expected: StreamKind,
        actual: StreamKind,
    },

    #[error("no analyzer registered for {0} stream")]
    UnsupportedKind(StreamKind),

    #[error("analyzer panicked: {0}")]
    Panicked(String),

    #[error("analysis pool is shut down")]
    PoolClosed,

    #[error("analysis worker dropped the result")]
    WorkerLost,

    #[error("failed to build analysis pool: {0}")]
    PoolBuild(String),
}
