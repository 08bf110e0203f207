//! # Callback Correlation Runtime
//!
//! Runtime implementation of the correlation engine.
//!
//! ## Core Components
//!
//! - **Ledger**: reserve/finalize over a durable [`LedgerStore`](callback_correlation_core::LedgerStore)
//! - **`InMemoryCorrelationStore`**: expiring, compare-and-insert record cache
//! - **`AwaitCompletion`**: races a oneshot wake signal against a timer
//! - **`InboundCallbackHandler`**: validates deliveries, stores records, wakes waiters
//! - **Correlator**: `reserve → send → wait → translate`
//!
//! ## Example
//!
//! ```ignore
//! use callback_correlation_runtime::{CorrelationEngine, Correlator, InMemoryCorrelationStore};
//!
//! let store = Arc::new(InMemoryCorrelationStore::new(config.retention));
//! let engine = CorrelationEngine::new(store, Arc::new(SystemClock));
//! let handler = engine.handler();          // give this to the callback listener
//! let correlator = Correlator::new(&engine, ledger, dispatcher, DiscoveryTranslator);
//!
//! let result = correlator
//!     .correlate(CorrelatedRequest::new(id, owner, payload, destination), config.txn_timeout)
//!     .await?;
//! ```

use callback_correlation_core::environment::Clock;
use callback_correlation_core::CorrelationStore;
use std::sync::Arc;

/// Runtime configuration loaded from the environment
pub mod config;

/// Caller-facing `correlate` composition
pub mod correlator;

/// Inbound callback handling
pub mod handler;

/// Reqwest-backed outbound dispatcher
pub mod http;

/// Reserve/finalize over a ledger store
pub mod ledger;

/// Prometheus metrics for observability
pub mod metrics;

/// Expiring in-memory correlation store
pub mod store;

/// Waiter registry and non-blocking wait
pub mod waiter;

pub use config::{CorrelationConfig, GatewayConfig};
pub use correlator::{CorrelatedRequest, Correlator};
pub use error::{ConfigError, CorrelationError, DeliveryError};
pub use handler::{DeliveryReceipt, InboundCallbackHandler};
pub use http::HttpDispatcher;
pub use ledger::Ledger;
pub use store::{InMemoryCorrelationStore, SweeperHandle};
pub use waiter::{AwaitCompletion, WaitHandle, WaitOutcome, WaiterRegistry};

/// Error types for the correlation runtime
pub mod error {
    use callback_correlation_core::{CorrelationKey, LedgerError, SendError, StoreError};
    use thiserror::Error;

    /// Errors surfaced to the caller of `correlate`.
    ///
    /// Timeouts and failure deliveries are not errors; they come back as
    /// [`DomainResult`](callback_correlation_core::DomainResult) variants.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum CorrelationError {
        /// The request id was already reserved
        #[error("Request {0} already exists")]
        Conflict(CorrelationKey),

        /// The outbound call failed before any wait was registered
        #[error(transparent)]
        Send(#[from] SendError),

        /// The ledger could not be reached while reserving
        #[error(transparent)]
        Ledger(LedgerError),

        /// Another waiter is already registered for this key in this process
        #[error("A waiter is already registered for {0}")]
        DuplicateWaiter(CorrelationKey),
    }

    impl From<LedgerError> for CorrelationError {
        fn from(err: LedgerError) -> Self {
            match err {
                LedgerError::Conflict(key) => Self::Conflict(key),
                other => Self::Ledger(other),
            }
        }
    }

    /// Errors reported to the transport that handed over a delivery.
    ///
    /// Validation failures are never reported here; they become failure
    /// records.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum DeliveryError {
        /// The delivery carries no usable correlation key
        #[error("Delivery carries no correlation key")]
        Uncorrelated,

        /// The correlation store could not accept the record
        #[error(transparent)]
        Store(StoreError),
    }

    /// Errors from loading configuration.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ConfigError {
        /// A required variable is not set
        #[error("Missing environment variable {0}")]
        Missing(&'static str),

        /// A variable is set but cannot be parsed
        #[error("Invalid value for {name}: {value}")]
        Invalid {
            /// Variable name
            name: &'static str,
            /// Offending value
            value: String,
        },
    }
}

/// Shared state wiring the inbound side to the waiting side.
///
/// The handler and every [`AwaitCompletion`] built from the same engine see the
/// same store and the same waiter registry, which is what lets a callback wake
/// the right caller.
pub struct CorrelationEngine<P> {
    store: Arc<dyn CorrelationStore<P>>,
    waiters: Arc<WaiterRegistry<P>>,
    clock: Arc<dyn Clock>,
}

impl<P> Clone for CorrelationEngine<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            waiters: Arc::clone(&self.waiters),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P: Clone + Send + 'static> CorrelationEngine<P> {
    /// Create an engine over a store and a clock.
    #[must_use]
    pub fn new(store: Arc<dyn CorrelationStore<P>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            waiters: Arc::new(WaiterRegistry::new()),
            clock,
        }
    }

    /// Handler to give to the transport/listener layer.
    #[must_use]
    pub fn handler(&self) -> InboundCallbackHandler<P> {
        InboundCallbackHandler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.waiters),
            Arc::clone(&self.clock),
        )
    }

    /// Wait side of the engine.
    #[must_use]
    pub fn awaiter(&self) -> AwaitCompletion<P> {
        AwaitCompletion::new(Arc::clone(&self.store), Arc::clone(&self.waiters))
    }

    /// The shared correlation store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn CorrelationStore<P>> {
        Arc::clone(&self.store)
    }

    /// Number of callers currently suspended.
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.waiters.pending_count()
    }
}
