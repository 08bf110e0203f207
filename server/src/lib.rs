//! Care-context discovery service.
//!
//! Wires the correlation engine to its production collaborators: the
//! `PostgreSQL` request ledger, the reqwest gateway dispatcher, the expiring
//! in-memory store with its sweeper, and the Prometheus recorder. The binary
//! in `main.rs` loads [`Config`] and serves [`app`].

pub mod config;

pub use config::{Config, ServerConfig};

use axum::{Router, routing::get};
use callback_correlation_web::{AppState, router};
use metrics_exporter_prometheus::PrometheusHandle;

/// Path the Prometheus scrape endpoint is served on.
pub const METRICS_PATH: &str = "/metrics";

/// Service router: the engine's routes plus the scrape endpoint when a
/// recorder is installed.
#[must_use]
pub fn app(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let routes = router(state);
    match metrics {
        Some(handle) => routes.merge(Router::new().route(
            METRICS_PATH,
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )),
        None => routes,
    }
}
