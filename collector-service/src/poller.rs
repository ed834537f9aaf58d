//! Poll cycle.
//!
//! One cycle connects, extracts server and database stats into a fresh
//! sink, and hands the drained measurements to every reporter. Cycles run
//! back to back; a slow cycle delays the next tick instead of overlapping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::config::MongoConfig;
use common::models::CycleReport;
use common::utils::IdGenerator;
use common::MetricSink;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::connection::Connector;
use crate::database_stats::extract_database_stats;
use crate::reporter::Reporter;
use crate::server_stats::extract_server_stats;

/// Drives poll cycles against one server.
pub struct Poller<C: Connector> {
    connector: C,
    config: MongoConfig,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl<C: Connector> Poller<C> {
    pub fn new(connector: C, config: MongoConfig, reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self {
            connector,
            config,
            reporters,
        }
    }

    /// Runs a single cycle and returns what it collected.
    ///
    /// A failed connection yields an empty report; nothing is propagated.
    pub async fn poll_once(&self) -> CycleReport {
        let cycle_id = IdGenerator::cycle_id();
        let span = tracing::info_span!("poll_cycle", cycle_id = %cycle_id);

        async {
            let started_at = Utc::now();
            let start = Instant::now();
            let mut sink = MetricSink::new();

            let connected = match self.connector.connect(&self.config).await {
                Ok(source) => {
                    self.collect(&source, &mut sink).await;
                    true
                }
                Err(e) => {
                    tracing::error!(
                        host = %self.config.host,
                        port = self.config.port,
                        error = %e,
                        "Could not connect to MongoDB"
                    );
                    false
                }
            };

            let report = CycleReport {
                cycle_id: cycle_id.clone(),
                started_at,
                duration_ms: start.elapsed().as_millis() as u64,
                connected,
                measurements: sink.drain(),
            };
            tracing::info!(
                connected,
                measurements = report.measurements.len(),
                duration_ms = report.duration_ms,
                "Poll cycle finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn collect(&self, source: &C::Source, sink: &mut MetricSink) {
        if let Err(e) = extract_server_stats(source, sink).await {
            tracing::error!(error = %e, "Could not fetch server stats");
        }
        if let Err(e) = extract_database_stats(source, &self.config.databases, sink).await {
            tracing::error!(severity = "critical", error = %e, "Could not fetch stats");
        }
    }

    /// Runs one cycle and passes the result to every reporter.
    pub async fn poll_and_report(&self) -> Arc<CycleReport> {
        let report = Arc::new(self.poll_once().await);
        for reporter in &self.reporters {
            if let Err(e) = reporter.report(&report).await {
                tracing::warn!(reporter = reporter.name(), error = %e, "Report failed");
            }
        }
        report
    }

    /// Polls every `interval` until `shutdown` flips to `true`.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_and_report().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Poller stopped");
    }
}
