//! # Callback Correlation Core
//!
//! Core traits and types for correlating an outbound request with the answer a
//! remote provider delivers later, out of band, as an independent callback.
//!
//! This crate holds no I/O. It defines the vocabulary every other crate in the
//! workspace speaks:
//!
//! - **Correlation key**: the identifier shared by a request and its callback
//! - **Completion record**: the tagged `Success`/`Failure` outcome stored per key
//! - **Ledger store**: durable "have we seen this id before?" registry
//! - **Outbound dispatcher**: sends the correlated request to a provider
//! - **Correlation store**: rendezvous cache where deliveries land
//! - **Delivery**: an inbound payload that knows its key and its own shape rules
//! - **Result translator**: pure mapping from a record to a caller-facing result
//!
//! ## Flow
//!
//! ```text
//! caller ──reserve──▶ LedgerStore
//!    │
//!    ├──send──▶ OutboundDispatcher ──▶ provider
//!    │                                    │
//!    │                                 callback
//!    │                                    ▼
//!    └──wait──◀── CorrelationStore ◀── Delivery (validated)
//!          │
//!          ▼
//!   ResultTranslator ──▶ DomainResult
//! ```
//!
//! The runtime pieces (waiters, timers, the inbound handler) live in
//! `callback-correlation-runtime`.

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod delivery;
pub mod discovery;
pub mod dispatch;
pub mod key;
pub mod ledger;
pub mod outcome;
pub mod store;
pub mod translate;

pub use delivery::{Delivery, Rejection};
pub use dispatch::{Destination, OutboundDispatcher, SendError};
pub use key::CorrelationKey;
pub use ledger::{LedgerError, LedgerStore, OwnerContext, PendingRequest, RequestStatus};
pub use outcome::{CompletionRecord, DomainResult, ErrorCode, Outcome};
pub use store::{CorrelationStore, StoreError};
pub use translate::{PassThrough, ResultTranslator};

/// Environment module - Dependency injection traits
///
/// All time-dependent behaviour is driven through [`Clock`](environment::Clock)
/// so that record timestamps are deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use callback_correlation_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
