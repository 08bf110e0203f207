//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the correlation engine:
//! - Correlated requests and how they resolved
//! - Reservation conflicts and outbound send failures
//! - Inbound deliveries by kind
//! - Store size and suspended waiters
//!
//! # Example
//!
//! ```rust,no_run
//! use callback_correlation_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Render for a scrape endpoint
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
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

/// Prometheus metrics recorder.
///
/// Installs the global recorder; the rendered text is served by whatever
/// HTTP surface the application exposes.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is advertised on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// logs a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "correlation_requests_total",
        "Total number of correlated requests, labelled by outcome"
    );
    describe_counter!(
        "correlation_conflicts_total",
        "Total number of requests rejected as duplicates by the ledger"
    );
    describe_counter!(
        "correlation_send_errors_total",
        "Total number of outbound sends that failed synchronously"
    );
    describe_histogram!(
        "correlation_wait_duration_seconds",
        "Time callers spent suspended waiting for a delivery"
    );
    describe_counter!(
        "correlation_deliveries_total",
        "Total number of inbound deliveries, labelled by kind"
    );
    describe_counter!(
        "correlation_ledger_finalize_errors_total",
        "Total number of best-effort ledger status updates that failed"
    );
    describe_counter!(
        "correlation_ledger_errors_total",
        "Total number of failed ledger queries, labelled by operation"
    );
    describe_gauge!(
        "correlation_store_entries",
        "Completion records currently held by the correlation store"
    );
    describe_gauge!(
        "correlation_pending_waiters",
        "Callers currently suspended waiting for a delivery"
    );
}

/// Correlation engine metrics recorder.
pub struct CorrelationMetrics;

impl CorrelationMetrics {
    /// Record how a correlated request resolved.
    pub fn record_resolution(outcome: &'static str, waited: Duration) {
        counter!("correlation_requests_total", "outcome" => outcome).increment(1);
        histogram!("correlation_wait_duration_seconds").record(waited.as_secs_f64());
    }

    /// Record a duplicate request id.
    pub fn record_conflict() {
        counter!("correlation_conflicts_total").increment(1);
    }

    /// Record a failed outbound send.
    pub fn record_send_error() {
        counter!("correlation_send_errors_total").increment(1);
    }

    /// Record an inbound delivery.
    ///
    /// `kind` is one of `success`, `failure`, `duplicate`, `uncorrelated`.
    pub fn record_delivery(kind: &'static str) {
        counter!("correlation_deliveries_total", "kind" => kind).increment(1);
    }

    /// Record a failed ledger status update.
    pub fn record_finalize_error() {
        counter!("correlation_ledger_finalize_errors_total").increment(1);
    }

    /// Record the number of held completion records.
    #[allow(clippy::cast_precision_loss)] // Entry counts fit in f64 mantissa
    pub fn record_store_size(entries: usize) {
        gauge!("correlation_store_entries").set(entries as f64);
    }

    /// Record the number of suspended waiters.
    #[allow(clippy::cast_precision_loss)] // Waiter counts fit in f64 mantissa
    pub fn record_pending_waiters(waiters: usize) {
        gauge!("correlation_pending_waiters").set(waiters as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        CorrelationMetrics::record_resolution("completed", Duration::from_millis(20));
        CorrelationMetrics::record_conflict();
        CorrelationMetrics::record_delivery("duplicate");
        CorrelationMetrics::record_store_size(3);
    }

    #[test]
    fn server_starts_without_handle_until_installed() {
        let server = MetricsServer::new("127.0.0.1:9090".parse().unwrap_or_else(|_| {
            SocketAddr::from(([127, 0, 0, 1], 9090))
        }));
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }
}
