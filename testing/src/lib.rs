//! # Callback Correlation Testing
//!
//! Testing utilities for the callback correlation engine.
//!
//! This crate provides:
//! - Mock implementations of the engine's seams (clock, ledger store, dispatcher)
//! - Builders for discovery payloads
//! - proptest strategies for correlation keys and patient records
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use callback_correlation_testing::{mocks::RecordingDispatcher, mocks::InMemoryLedgerStore, test_clock};
//!
//! #[tokio::test(start_paused = true)]
//! async fn resolves_when_callback_arrives() {
//!     let ledger = Ledger::new(Arc::new(InMemoryLedgerStore::new()), Arc::new(test_clock()));
//!     let dispatcher = Arc::new(RecordingDispatcher::new());
//!     let correlator = Correlator::new(&engine, ledger, dispatcher.clone(), DiscoveryTranslator);
//!     // ...
//!     assert_eq!(dispatcher.sent().len(), 1);
//! }
//! ```

use callback_correlation_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use callback_correlation_core::{
        CorrelationKey, Destination, LedgerError, LedgerStore, OutboundDispatcher,
        PendingRequest, RequestStatus, SendError,
    };
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, so record timestamps are reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use callback_correlation_testing::mocks::FixedClock;
    /// use callback_correlation_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the engine.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// In-memory [`LedgerStore`].
    ///
    /// Atomic within one process. Cloning shares the underlying map, so a test
    /// can hand one clone to the engine and inspect another.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryLedgerStore {
        entries: Arc<Mutex<HashMap<CorrelationKey, PendingRequest>>>,
        fail_updates: bool,
    }

    impl InMemoryLedgerStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every `update_status` call fail with a storage error.
        #[must_use]
        pub fn with_failing_updates(mut self) -> Self {
            self.fail_updates = true;
            self
        }

        /// Current status of `id`, if reserved.
        #[must_use]
        pub fn status_of(&self, id: &CorrelationKey) -> Option<RequestStatus> {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(id)
                .map(|entry| entry.status)
        }

        /// Number of reserved ids.
        #[must_use]
        pub fn len(&self) -> usize {
            self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing has been reserved.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl LedgerStore for InMemoryLedgerStore {
        fn insert_if_absent<'a>(
            &'a self,
            request: &'a PendingRequest,
        ) -> BoxFuture<'a, Result<bool, LedgerError>> {
            Box::pin(async move {
                let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
                if entries.contains_key(&request.id) {
                    return Ok(false);
                }
                entries.insert(request.id.clone(), request.clone());
                Ok(true)
            })
        }

        fn update_status<'a>(
            &'a self,
            id: &'a CorrelationKey,
            status: RequestStatus,
        ) -> BoxFuture<'a, Result<(), LedgerError>> {
            Box::pin(async move {
                if self.fail_updates {
                    return Err(LedgerError::Storage("update failed".to_string()));
                }
                let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
                match entries.get_mut(id) {
                    Some(entry) => {
                        entry.status = status;
                        Ok(())
                    }
                    None => Err(LedgerError::NotFound(id.clone())),
                }
            })
        }

        fn find<'a>(
            &'a self,
            id: &'a CorrelationKey,
        ) -> BoxFuture<'a, Result<Option<PendingRequest>, LedgerError>> {
            Box::pin(async move {
                Ok(self
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(id)
                    .cloned())
            })
        }
    }

    /// One captured outbound call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentRequest<Q> {
        /// Key the request was sent under
        pub key: CorrelationKey,
        /// Payload as sent
        pub payload: Q,
        /// Destination it was sent to
        pub destination: Destination,
    }

    /// [`OutboundDispatcher`] that records every call instead of sending it.
    ///
    /// Optionally fails every call with a fixed [`SendError`]; failed calls
    /// are not recorded.
    #[derive(Debug, Clone)]
    pub struct RecordingDispatcher<Q> {
        sent: Arc<Mutex<Vec<SentRequest<Q>>>>,
        failure: Option<SendError>,
    }

    impl<Q> Default for RecordingDispatcher<Q> {
        fn default() -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                failure: None,
            }
        }
    }

    impl<Q: Clone> RecordingDispatcher<Q> {
        /// Create a dispatcher that accepts every request.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a dispatcher that fails every request with `error`.
        #[must_use]
        pub fn failing(error: SendError) -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                failure: Some(error),
            }
        }

        /// Requests accepted so far, in order.
        #[must_use]
        pub fn sent(&self) -> Vec<SentRequest<Q>> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl<Q: Clone + Send + Sync> OutboundDispatcher<Q> for RecordingDispatcher<Q> {
        fn send<'a>(
            &'a self,
            key: &'a CorrelationKey,
            payload: &'a Q,
            destination: &'a Destination,
        ) -> BoxFuture<'a, Result<(), SendError>> {
            Box::pin(async move {
                if let Some(error) = &self.failure {
                    return Err(error.clone());
                }
                self.sent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(SentRequest {
                        key: key.clone(),
                        payload: payload.clone(),
                        destination: destination.clone(),
                    });
                Ok(())
            })
        }
    }
}

/// Builders for discovery payloads.
pub mod builders {
    use callback_correlation_core::discovery::{
        CareContext, DiscoveryRequest, DiscoveryResult, GatewayResponse, Identifier,
        PatientQuery, PatientRecord, ProviderError,
    };
    use callback_correlation_core::CorrelationKey;
    use callback_correlation_core::environment::Clock;

    /// Patient record with one care context per reference.
    ///
    /// An empty slice yields a patient with an empty care-context list.
    #[must_use]
    pub fn patient_with_care_contexts(references: &[&str]) -> PatientRecord {
        PatientRecord {
            reference_number: Some("PAT-001".to_string()),
            display: Some("John Doe".to_string()),
            care_contexts: Some(
                references
                    .iter()
                    .map(|reference| CareContext {
                        reference_number: Some((*reference).to_string()),
                        display: Some(format!("Visit {reference}")),
                    })
                    .collect(),
            ),
            matched_by: vec!["MOBILE".to_string()],
        }
    }

    /// Callback payload answering `request_id`.
    #[must_use]
    pub fn discovery_result(request_id: &str, patient: Option<PatientRecord>) -> DiscoveryResult {
        DiscoveryResult {
            request_id: Some(format!("callback-{request_id}")),
            timestamp: None,
            transaction_id: Some(format!("txn-{request_id}")),
            patient,
            error: None,
            resp: Some(GatewayResponse {
                request_id: Some(request_id.to_string()),
            }),
        }
    }

    /// Callback payload in which the provider reports it could not find the
    /// patient: an error and no patient.
    #[must_use]
    pub fn provider_error_result(request_id: &str, code: i32, message: &str) -> DiscoveryResult {
        DiscoveryResult {
            error: Some(ProviderError {
                code,
                message: message.to_string(),
            }),
            ..discovery_result(request_id, None)
        }
    }

    /// Outbound discovery request carrying `request_id`.
    #[must_use]
    pub fn discovery_request(request_id: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            request_id: CorrelationKey::new(request_id),
            timestamp: super::mocks::test_clock().now(),
            transaction_id: format!("txn-{request_id}"),
            patient: PatientQuery {
                id: "alice@ncg".to_string(),
                name: "Alice".to_string(),
                gender: "F".to_string(),
                year_of_birth: Some(1990),
                verified_identifiers: vec![Identifier {
                    kind: "MOBILE".to_string(),
                    value: "+91-9999999999".to_string(),
                }],
                unverified_identifiers: Vec::new(),
            },
        }
    }
}

/// proptest strategies for engine types.
pub mod strategies {
    use callback_correlation_core::CorrelationKey;
    use callback_correlation_core::discovery::{CareContext, PatientRecord};
    use proptest::prelude::*;

    /// Non-blank correlation keys.
    pub fn correlation_key() -> impl Strategy<Value = CorrelationKey> {
        "[A-Za-z0-9-]{1,36}".prop_map(CorrelationKey::new)
    }

    /// Optional references, blank ones included.
    pub fn reference() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some("   ".to_string())),
            "[A-Z0-9-]{1,12}".prop_map(Some),
        ]
    }

    /// Patient records with arbitrary (possibly invalid) references.
    pub fn patient_record() -> impl Strategy<Value = PatientRecord> {
        (
            reference(),
            proptest::option::of(proptest::collection::vec(reference(), 0..5)),
        )
            .prop_map(|(reference_number, contexts)| PatientRecord {
                reference_number,
                display: Some("Patient".to_string()),
                care_contexts: contexts.map(|refs| {
                    refs.into_iter()
                        .map(|reference_number| CareContext {
                            reference_number,
                            display: None,
                        })
                        .collect()
                }),
                matched_by: Vec::new(),
            })
    }
}

/// Install a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
