use thiserror::Error;

use umbrella_compute::AnalysisError;
use umbrella_core::{CoreError, StreamKind};
use umbrella_notify::NotifyError;

/// Startup and lifecycle failures. Per-record problems never surface here.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("alert channel setup failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("analysis pool setup failed: {0}")]
    Pool(#[from] AnalysisError),

    #[error("{0} stream is already registered")]
    DuplicateStream(StreamKind),

    #[error("orchestrator already started")]
    AlreadyStarted,
}
