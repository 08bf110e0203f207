//! Application state for Axum handlers.

use callback_correlation_core::discovery::{DiscoveryRequest, DiscoveryResult, DiscoveryTranslator};
use callback_correlation_runtime::{CorrelationEngine, Correlator};
use std::time::Duration;

/// Discovery correlator as wired into the web adapter.
pub type DiscoveryCorrelator = Correlator<DiscoveryRequest, DiscoveryResult, DiscoveryTranslator>;

/// Application state shared across all HTTP handlers.
///
/// The callback route and the discovery route must share one
/// [`CorrelationEngine`], otherwise callbacks cannot wake the callers.
#[derive(Clone)]
pub struct AppState {
    /// Engine shared with the correlator
    pub engine: CorrelationEngine<DiscoveryResult>,
    /// Issues discovery requests and waits for their callbacks
    pub correlator: DiscoveryCorrelator,
    /// How long a discovery request waits for its callback
    pub txn_timeout: Duration,
}

impl AppState {
    /// Create application state.
    #[must_use]
    pub const fn new(
        engine: CorrelationEngine<DiscoveryResult>,
        correlator: DiscoveryCorrelator,
        txn_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            correlator,
            txn_timeout,
        }
    }
}
