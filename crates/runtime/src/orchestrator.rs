//! Wires the streams, the analysis pool, routing and alerting together,
//! and owns the shutdown sequence.
//!
//! Each registered stream gets two tasks: an ingestion loop that fills the
//! stream's bounded queue, and a consumer that drains it through the shared
//! analysis pool into the router. Shutdown runs in a fixed order so nothing
//! already accepted is lost:
//!
//! 1. flip the stop signal so ingestion stops fetching,
//! 2. wait for ingestion, which closes each queue,
//! 3. wait for consumers to drain their queues,
//! 4. shut the pool down,
//! 5. deliver queued alerts,
//! 6. stop the metrics reporter and report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument, Span};

use umbrella_compute::{AnalysisPool, AnalyzerRegistry};
use umbrella_core::{Config, MetricStatus, StreamKind};
use umbrella_ingest::{IngestSummary, RecordSource, StreamPipeline, StreamQueue};
use umbrella_notify::{build_notifier, AlertDispatcher, DeliveryStats, Notifier};

use crate::error::RuntimeError;
use crate::monitor::{report_periodically, MetricsMonitor, StreamStats};
use crate::router::ResultRouter;

/// What a stream's consumer saw before its queue closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerSummary {
    pub processed: u64,
    pub ok: u64,
    pub alerts: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    #[serde(skip)]
    pub ingest: BTreeMap<StreamKind, IngestSummary>,
    pub consumed: BTreeMap<StreamKind, ConsumerSummary>,
    pub delivery: DeliveryStats,
    pub metrics: BTreeMap<StreamKind, StreamStats>,
}

impl ShutdownReport {
    pub fn log(&self) {
        for (kind, ingest) in &self.ingest {
            let consumed = self.consumed.get(kind).copied().unwrap_or_default();
            info!(
                stream = %kind,
                fetched = ingest.fetched,
                pushed = ingest.pushed,
                warnings = ingest.warnings,
                processed = consumed.processed,
                alerts = consumed.alerts,
                errors = consumed.errors,
                "stream finished"
            );
        }
        info!(
            delivered = self.delivery.delivered,
            failed = self.delivery.failed,
            dropped = self.delivery.dropped,
            "alerts"
        );
    }
}

/// Fluent setup for an [`Orchestrator`].
///
/// `build` validates the configuration and sets up the alert channel and
/// analysis pool; any problem fails here, before a single record is fetched.
pub struct OrchestratorBuilder {
    config: Config,
    notifier: Option<Box<dyn Notifier>>,
    registry: Option<AnalyzerRegistry>,
    span: Option<Span>,
}

impl OrchestratorBuilder {
    /// Use this notifier instead of the one named by `ALERT_CHANNEL`.
    pub fn notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use this analyzer registry instead of the standard one.
    pub fn registry(mut self, registry: AnalyzerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parent span for every component's logs.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RuntimeError> {
        self.config.validate()?;

        let span = self.span.unwrap_or_else(|| {
            info_span!("pipeline", profile = %self.config.profile_label())
        });
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => build_notifier(&self.config.alerts)?,
        };
        let registry = self.registry.unwrap_or_else(AnalyzerRegistry::standard);
        let pool = span.in_scope(|| AnalysisPool::new(self.config.processing.pool_size, registry))?;
        let pool = pool.with_span(info_span!(parent: &span, "analysis_pool", size = self.config.processing.pool_size));
        let monitor = MetricsMonitor::new().with_span(info_span!(parent: &span, "metrics"));
        let (shutdown_tx, _) = watch::channel(false);
        let (ingest_done_tx, ingest_done) = mpsc::unbounded_channel();

        Ok(Orchestrator {
            config: self.config,
            pool: Arc::new(pool),
            monitor: Arc::new(monitor),
            notifier: Some(notifier),
            dispatcher: None,
            pending: Vec::new(),
            shutdown_tx,
            ingest_done_tx: Some(ingest_done_tx),
            ingest_done,
            ingest: BTreeMap::new(),
            consumers: Vec::new(),
            reporter: None,
            started: false,
            span,
        })
    }
}

pub struct Orchestrator {
    config: Config,
    pool: Arc<AnalysisPool>,
    monitor: Arc<MetricsMonitor>,
    /// Taken by `start` to spawn the dispatcher.
    notifier: Option<Box<dyn Notifier>>,
    dispatcher: Option<AlertDispatcher>,
    /// Streams registered but not yet started.
    pending: Vec<(StreamKind, Arc<dyn RecordSource>)>,
    shutdown_tx: watch::Sender<bool>,
    ingest_done_tx: Option<mpsc::UnboundedSender<(StreamKind, IngestSummary)>>,
    ingest_done: mpsc::UnboundedReceiver<(StreamKind, IngestSummary)>,
    ingest: BTreeMap<StreamKind, IngestSummary>,
    consumers: Vec<JoinHandle<(StreamKind, ConsumerSummary)>>,
    reporter: Option<JoinHandle<()>>,
    started: bool,
    span: Span,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            notifier: None,
            registry: None,
            span: None,
        }
    }

    /// Validate `config` and build with the configured alert channel.
    pub fn new(config: Config) -> Result<Self, RuntimeError> {
        Self::builder(config).build()
    }

    /// Build from `config` and register every stream in one step. This is
    /// the whole startup path; nothing is fetched until `start`.
    pub fn with_streams(
        config: Config,
        streams: impl IntoIterator<Item = (StreamKind, Arc<dyn RecordSource>)>,
    ) -> Result<Self, RuntimeError> {
        let mut orchestrator = Self::new(config)?;
        for (kind, source) in streams {
            orchestrator.add_stream(kind, source)?;
        }
        Ok(orchestrator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn monitor(&self) -> Arc<MetricsMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn pool(&self) -> Arc<AnalysisPool> {
        Arc::clone(&self.pool)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Register a stream. Must happen before `start`; one source per kind.
    pub fn add_stream(
        &mut self,
        kind: StreamKind,
        source: Arc<dyn RecordSource>,
    ) -> Result<(), RuntimeError> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        if self.pending.iter().any(|(k, _)| *k == kind) {
            return Err(RuntimeError::DuplicateStream(kind));
        }
        self.pending.push((kind, source));
        Ok(())
    }

    /// Spawn the alert dispatcher, every registered stream, and the metrics
    /// reporter on the current runtime.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.started = true;
        let _enter = self.span.enter();

        let notifier = self.notifier.take().ok_or(RuntimeError::AlreadyStarted)?;
        let dispatcher =
            AlertDispatcher::spawn(notifier, self.config.processing.alert_queue_capacity);
        let router = Arc::new(
            ResultRouter::new(
                self.config.alerts.critical_threshold,
                Arc::clone(&self.monitor),
                dispatcher.handle(),
            )
            .with_span(info_span!("router")),
        );
        self.dispatcher = Some(dispatcher);

        let done_tx = self.ingest_done_tx.take();
        for (kind, source) in std::mem::take(&mut self.pending) {
            let stream_config = self.config.streams.get(kind);
            let (pipeline, queue) = StreamPipeline::new(kind, source, stream_config);
            let pipeline = pipeline.with_span(info_span!("stream", kind = %kind, source = %stream_config.source));

            let shutdown = self.shutdown_tx.subscribe();
            let done = done_tx.clone();
            tokio::spawn(
                async move {
                    let summary = pipeline.ingest(shutdown).await;
                    if let Some(done) = done {
                        let _ = done.send((kind, summary));
                    }
                }
                .in_current_span(),
            );

            let consumer = consume(kind, queue, Arc::clone(&self.pool), Arc::clone(&router))
                .instrument(info_span!("consumer", kind = %kind));
            self.consumers.push(tokio::spawn(consumer));
            info!(stream = %kind, "stream started");
        }

        if self.config.metrics.enabled {
            let reporter = report_periodically(
                Arc::clone(&self.monitor),
                self.config.metrics.interval(),
                self.shutdown_tx.subscribe(),
            );
            self.reporter = Some(tokio::spawn(reporter.in_current_span()));
        }

        info!(
            streams = self.consumers.len(),
            pool_size = self.pool.size(),
            channel = %self.config.alerts.channel,
            "pipeline started"
        );
        Ok(())
    }

    /// Collect ingestion summaries until every ingestion task has ended.
    /// Safe to cancel; summaries received so far are kept.
    async fn collect_ingest(&mut self) {
        while let Some((kind, summary)) = self.ingest_done.recv().await {
            self.ingest.insert(kind, summary);
        }
    }

    /// Run until every source is exhausted, then shut down.
    pub async fn finish(mut self) -> Result<ShutdownReport, RuntimeError> {
        if !self.started {
            self.start()?;
        }
        self.collect_ingest().await;
        Ok(self.shutdown().await)
    }

    /// Run until SIGINT/SIGTERM, the optional time limit, or every source
    /// being exhausted, whichever comes first; then shut down.
    pub async fn run_until_signal(
        mut self,
        limit: Option<Duration>,
    ) -> Result<ShutdownReport, RuntimeError> {
        if !self.started {
            self.start()?;
        }
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let reason = tokio::select! {
            _ = os_signal() => "shutdown signal received",
            _ = deadline => "run time limit reached",
            _ = self.collect_ingest() => "all sources exhausted",
        };
        info!(parent: &self.span, "{reason}");
        Ok(self.shutdown().await)
    }

    /// Stop gracefully. Everything already fetched is analyzed, routed and
    /// recorded before this returns.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let span = self.span.clone();
        async move {
            info!("shutting down");
            self.shutdown_tx.send_replace(true);

            // Tasks never started still hold nothing; drop our sender so the
            // collection below terminates.
            self.ingest_done_tx.take();
            self.collect_ingest().await;

            let mut consumed = BTreeMap::new();
            for handle in std::mem::take(&mut self.consumers) {
                match handle.await {
                    Ok((kind, summary)) => {
                        consumed.insert(kind, summary);
                    }
                    Err(e) => warn!(error = %e, "consumer task failed"),
                }
            }

            self.pool.shutdown().await;

            let delivery = match self.dispatcher.take() {
                Some(dispatcher) => dispatcher.shutdown().await,
                None => DeliveryStats::default(),
            };

            if let Some(reporter) = self.reporter.take() {
                if let Err(e) = reporter.await {
                    warn!(error = %e, "metrics reporter failed");
                }
            }

            if self.config.metrics.enabled {
                self.monitor.log_summary();
            }

            let report = ShutdownReport {
                ingest: std::mem::take(&mut self.ingest),
                consumed,
                delivery,
                metrics: self.monitor.summary(),
            };
            report.log();
            info!("shutdown complete");
            report
        }
        .instrument(span)
        .await
    }
}

/// Drain one stream's queue through the pool and router until it closes.
async fn consume(
    kind: StreamKind,
    mut queue: StreamQueue,
    pool: Arc<AnalysisPool>,
    router: Arc<ResultRouter>,
) -> (StreamKind, ConsumerSummary) {
    let mut summary = ConsumerSummary::default();
    while let Some(record) = queue.pop().await {
        let started = Instant::now();
        let result = pool.submit(kind, record).await;
        let status = router.route(&result, started.elapsed());

        summary.processed += 1;
        match status {
            MetricStatus::Ok => summary.ok += 1,
            MetricStatus::Alert => summary.alerts += 1,
            MetricStatus::Error => summary.errors += 1,
        }
    }
    info!(processed = summary.processed, "queue drained");
    (kind, summary)
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
///
/// If no handler can be installed this never resolves, leaving the other
/// stop conditions in charge.
pub async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to register signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    }
}
