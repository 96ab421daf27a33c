//! Prometheus metrics for observability and monitoring.
//!
//! Metric collection for the runtime and the scoring domain:
//! - Store commands, reducer timing and effect execution
//! - Attempt ledger writes
//! - Result snapshot broadcasts
//! - Advancement runs and start list reorders
//! - Live channel reconnects
//!
//! # Example
//!
//! ```rust,no_run
//! use topout_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut metrics = MetricsServer::new();
//! metrics.start()?;
//!
//! // Serve `metrics.render()` from the HTTP service's /metrics route.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder whose output is served by the host HTTP service.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("started", &self.handle.is_some())
            .finish()
    }
}

impl MetricsServer {
    /// Create a metrics server that has not been started yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. A second `start()`
    /// (as happens across tests) logs a warning, succeeds, and leaves this
    /// instance without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance never installed the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("store.commands.total", "Actions sent to stores");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside reducers"
    );
    describe_counter!("store.effects.executed", "Effects executed, by type");

    describe_counter!(
        "ledger.writes.total",
        "Attempt ledger upserts, by outcome"
    );
    describe_counter!(
        "results.broadcasts.total",
        "Result snapshots published to live observers"
    );
    describe_counter!("advancement.runs.total", "Advancement runs, by outcome");
    describe_counter!(
        "startlist.reorders.total",
        "Start order replacements, by outcome"
    );
    describe_counter!(
        "live.reconnects.total",
        "Live channel reconnect attempts"
    );
    describe_histogram!(
        "results.compute.duration_seconds",
        "Time taken to rank a competition"
    );
}

/// Attempt ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record a ledger upsert.
    pub fn record_write(succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "error" };
        counter!("ledger.writes.total", "outcome" => outcome).increment(1);
    }
}

/// Result snapshot metrics recorder.
pub struct ResultsMetrics;

impl ResultsMetrics {
    /// Record a snapshot computation.
    pub fn record_compute(duration: Duration) {
        histogram!("results.compute.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a snapshot publish to `receivers` live observers.
    pub fn record_broadcast(receivers: usize) {
        counter!("results.broadcasts.total").increment(1);
        gauge!("results.observers").set(f64::from(u32::try_from(receivers).unwrap_or(u32::MAX)));
    }
}

/// Advancement metrics recorder.
pub struct AdvancementMetrics;

impl AdvancementMetrics {
    /// Record an advancement run with its outcome label
    /// (`ok`, `partial`, `conflict`, `error`).
    pub fn record_run(outcome: &'static str) {
        counter!("advancement.runs.total", "outcome" => outcome).increment(1);
    }
}

/// Start list metrics recorder.
pub struct StartlistMetrics;

impl StartlistMetrics {
    /// Record a start order replacement.
    pub fn record_reorder(succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "error" };
        counter!("startlist.reorders.total", "outcome" => outcome).increment(1);
    }
}

/// Live channel metrics recorder.
pub struct LiveMetrics;

impl LiveMetrics {
    /// Record a reconnect attempt.
    pub fn record_reconnect() {
        counter!("live.reconnects.total").increment(1);
    }
}
