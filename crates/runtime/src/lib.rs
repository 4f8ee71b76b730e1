//! Runs the sample pipeline: result routing, the metrics ledger, and the
//! orchestrator that owns every task and the shutdown order.

pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod router;

pub use error::RuntimeError;
pub use monitor::{report_periodically, MetricsMonitor, StreamStats};
pub use orchestrator::{
    os_signal, ConsumerSummary, Orchestrator, OrchestratorBuilder, ShutdownReport,
};
pub use router::{alert_message, alert_payload, classify, ResultRouter, RouteStatus};
