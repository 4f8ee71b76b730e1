//! umbrella-pipeline: runs the multi-stream sample pipeline against the
//! built-in simulated sources until interrupted.
//!
//! Configuration comes from the environment (and `.env`); see `Config`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use umbrella_core::{config, Config, StreamKind};
use umbrella_ingest::{RecordSource, SimulatedSource};
use umbrella_runtime::Orchestrator;

// ── CLI ─────────────────────────────────────────────────────────────

/// Concurrent genetic, biochemical and physical sample pipeline.
#[derive(Parser, Debug)]
#[command(name = "umbrella-pipeline", version, about)]
struct Cli {
    /// Configuration profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "UMBRELLA_PROFILE")]
    profile: Option<String>,

    /// Streams to run, comma separated. Defaults to all three.
    #[arg(long, value_delimiter = ',')]
    streams: Vec<StreamKind>,

    /// Stop after this many seconds instead of waiting for a signal.
    #[arg(long, env = "UMBRELLA_RUN_SECS")]
    duration_secs: Option<u64>,

    /// Simulated fetch latency per record in milliseconds.
    #[arg(long, env = "UMBRELLA_SOURCE_LATENCY_MS", default_value_t = 0)]
    source_latency_ms: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();

    let config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    config.log_summary();

    let streams = if cli.streams.is_empty() {
        StreamKind::ALL.to_vec()
    } else {
        cli.streams
    };

    let latency = Duration::from_millis(cli.source_latency_ms);
    let sources: Vec<(StreamKind, Arc<dyn RecordSource>)> = streams
        .into_iter()
        .map(|kind| {
            let name = config.streams.get(kind).source.clone();
            let source: Arc<dyn RecordSource> =
                Arc::new(SimulatedSource::new(kind, name).with_latency(latency));
            (kind, source)
        })
        .collect();

    let orchestrator = Orchestrator::with_streams(config, sources)?;
    let report = orchestrator
        .run_until_signal(cli.duration_secs.map(Duration::from_secs))
        .await?;

    let processed: u64 = report.consumed.values().map(|c| c.processed).sum();
    info!(processed, alerts_delivered = report.delivery.delivered, "umbrella-pipeline exited");
    Ok(())
}
