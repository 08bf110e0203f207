//! Care-context discovery HTTP server.
//!
//! Sends discovery requests to providers through the gateway and answers
//! callers once the matching `on-discover` callback arrives.

use anyhow::Context;
use callback_correlation_core::discovery::{DiscoveryResult, DiscoveryTranslator};
use callback_correlation_core::environment::{Clock, SystemClock};
use callback_correlation_postgres::PostgresLedgerStore;
use callback_correlation_runtime::metrics::MetricsServer;
use callback_correlation_runtime::{
    CorrelationEngine, Correlator, HttpDispatcher, InMemoryCorrelationStore, Ledger,
};
use callback_correlation_server::{Config, app};
use callback_correlation_web::AppState;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callback_correlation=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting care-context discovery server");

    let config = Config::from_env().context("Failed to load configuration")?;
    let addr = config.server.socket_addr()?;
    info!(
        gateway_url = %config.gateway.base_url,
        txn_timeout_ms = config.correlation.txn_timeout.as_millis(),
        retention_secs = config.correlation.retention.as_secs(),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(addr);
    metrics.start()?;

    info!("Connecting to request ledger database...");
    let pool = config.postgres.connect().await?;
    let ledger_store = PostgresLedgerStore::new(pool);
    ledger_store.migrate().await?;
    info!("Request ledger ready");

    let store = InMemoryCorrelationStore::<DiscoveryResult>::new(config.correlation.retention);
    let sweeper = store.spawn_sweeper(config.correlation.sweep_interval);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = CorrelationEngine::new(Arc::new(store), Arc::clone(&clock));
    let ledger = Ledger::new(Arc::new(ledger_store), clock);
    let dispatcher = HttpDispatcher::new(&config.gateway)?;
    let correlator = Correlator::new(&engine, ledger, Arc::new(dispatcher), DiscoveryTranslator);

    let state = AppState::new(engine, correlator, config.correlation.txn_timeout);
    let app = app(state, metrics.handle().cloned());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
