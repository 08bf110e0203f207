//! Axum adapter for the callback correlation engine.
//!
//! Exposes the gateway-facing callback listener next to the caller-facing
//! discovery route. Both share one [`CorrelationEngine`](callback_correlation_runtime::CorrelationEngine)
//! through [`AppState`], which is what lets a callback wake the request
//! that is waiting for it.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/v0.5/care-contexts/on-discover` | [`handlers::on_discover`] |
//! | `POST` | `/v1/care-contexts/discover` | [`handlers::discover`] |
//! | `GET`  | `/v1/correlations/{key}` | [`handlers::get_correlation`] |
//! | `GET`  | `/health` | [`handlers::health_check`] |
//! | `GET`  | `/health/ready` | [`handlers::readiness`] |
//!
//! # Example
//!
//! ```ignore
//! use callback_correlation_web::{AppState, router};
//!
//! let state = AppState::new(engine, correlator, config.txn_timeout);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::{AppError, resolve};
pub use middleware::{TRACE_ID_HEADER, TraceId, trace_id};
pub use state::{AppState, DiscoveryCorrelator};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Gateway callback path for discovery results.
pub const ON_DISCOVER_PATH: &str = "/v0.5/care-contexts/on-discover";

/// Build the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(ON_DISCOVER_PATH, post(handlers::on_discover))
        .route("/v1/care-contexts/discover", post(handlers::discover))
        .route("/v1/correlations/:key", get(handlers::get_correlation))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness))
        .layer(axum::middleware::from_fn(trace_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
