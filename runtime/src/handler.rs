//! Inbound callback handling.
//!
//! The transport layer (an HTTP route, a message consumer) hands every
//! delivery to [`InboundCallbackHandler`]. The handler never reports a
//! malformed payload back to the transport: it turns it into a failure record
//! so the waiting caller learns why its request failed.

use crate::error::DeliveryError;
use crate::metrics::CorrelationMetrics;
use crate::waiter::WaiterRegistry;
use callback_correlation_core::environment::Clock;
use callback_correlation_core::{
    CompletionRecord, CorrelationKey, CorrelationStore, Delivery, StoreError,
};
use std::sync::Arc;

/// What happened to an accepted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReceipt {
    /// A new record was stored.
    Stored {
        /// Whether a suspended caller was woken
        waiter_notified: bool,
    },
    /// A record for this key already existed; the new delivery was discarded.
    Duplicate,
}

/// Receives deliveries, stores completion records and wakes waiters.
///
/// Safe to call concurrently and for keys nobody is waiting on.
pub struct InboundCallbackHandler<P> {
    store: Arc<dyn CorrelationStore<P>>,
    waiters: Arc<WaiterRegistry<P>>,
    clock: Arc<dyn Clock>,
}

impl<P> Clone for InboundCallbackHandler<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            waiters: Arc::clone(&self.waiters),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P> InboundCallbackHandler<P> {
    /// Create a handler sharing a store and waiter registry with the wait side.
    #[must_use]
    pub fn new(
        store: Arc<dyn CorrelationStore<P>>,
        waiters: Arc<WaiterRegistry<P>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            waiters,
            clock,
        }
    }
}

impl<P: Delivery> InboundCallbackHandler<P> {
    /// Handle a delivery whose key the transport already extracted.
    ///
    /// Structurally invalid payloads are stored as failure records and the
    /// call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Uncorrelated`] for a blank key and
    /// [`DeliveryError::Store`] if the store cannot accept the record.
    pub fn deliver(
        &self,
        key: CorrelationKey,
        payload: P,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if key.is_blank() {
            tracing::error!("Dropping delivery with blank correlation key");
            CorrelationMetrics::record_delivery("uncorrelated");
            return Err(DeliveryError::Uncorrelated);
        }

        let received_at = self.clock.now();
        let record = match payload.validate() {
            Ok(()) => CompletionRecord::success(key.clone(), payload, received_at),
            Err(rejection) => {
                tracing::error!(
                    correlation_key = %key,
                    code = %rejection.code,
                    message = %rejection.message,
                    "Invalid delivery recorded as failure"
                );
                CompletionRecord::failure(key.clone(), rejection.code, rejection.message, received_at)
            }
        };
        let kind = if record.outcome.is_success() {
            "success"
        } else {
            "failure"
        };

        // Store before signalling; a waiter that registers late finds the record
        match self.store.put(record.clone()) {
            Ok(()) => {}
            Err(StoreError::AlreadyPresent(_)) => {
                tracing::warn!(correlation_key = %key, "Duplicate delivery ignored");
                CorrelationMetrics::record_delivery("duplicate");
                return Ok(DeliveryReceipt::Duplicate);
            }
            Err(error) => {
                tracing::error!(correlation_key = %key, error = %error, "Failed to store delivery");
                return Err(DeliveryError::Store(error));
            }
        }

        let waiter_notified = self.waiters.notify(record);
        CorrelationMetrics::record_delivery(kind);
        tracing::info!(correlation_key = %key, kind, waiter_notified, "Delivery stored");

        Ok(DeliveryReceipt::Stored { waiter_notified })
    }

    /// Handle a raw delivery, extracting its key from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Uncorrelated`] if the payload carries no
    /// correlation key, otherwise as [`deliver`](Self::deliver).
    pub fn on_delivery(&self, payload: P) -> Result<DeliveryReceipt, DeliveryError> {
        let Some(key) = payload.correlation_key() else {
            tracing::error!("Dropping delivery without a correlation key");
            CorrelationMetrics::record_delivery("uncorrelated");
            return Err(DeliveryError::Uncorrelated);
        };
        self.deliver(key, payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::store::InMemoryCorrelationStore;
    use callback_correlation_core::discovery::{DiscoveryResult, MISSING_CARE_CONTEXTS};
    use callback_correlation_core::{ErrorCode, Outcome};
    use callback_correlation_testing::builders::{discovery_result, patient_with_care_contexts};
    use callback_correlation_testing::{ManualClock, test_clock};
    use std::time::Duration;

    struct Fixture {
        handler: InboundCallbackHandler<DiscoveryResult>,
        store: InMemoryCorrelationStore<DiscoveryResult>,
        waiters: Arc<WaiterRegistry<DiscoveryResult>>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryCorrelationStore::new(Duration::from_secs(300));
        let waiters = Arc::new(WaiterRegistry::new());
        let handler = InboundCallbackHandler::new(
            Arc::new(store.clone()),
            Arc::clone(&waiters),
            Arc::new(test_clock()),
        );
        Fixture {
            handler,
            store,
            waiters,
        }
    }

    #[test]
    fn records_are_stamped_with_the_handler_clock() {
        let clock = ManualClock::new(test_clock().now());
        let store = InMemoryCorrelationStore::new(Duration::from_secs(300));
        let handler = InboundCallbackHandler::new(
            Arc::new(store.clone()),
            Arc::new(WaiterRegistry::new()),
            Arc::new(clock.clone()),
        );

        clock.advance(chrono::Duration::minutes(2));
        handler
            .on_delivery(discovery_result("R5", Some(patient_with_care_contexts(&["CC-1"]))))
            .unwrap();

        let record = store.get(&CorrelationKey::new("R5")).unwrap();
        assert_eq!(record.received_at, test_clock().now() + chrono::Duration::minutes(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_deliveries_for_one_key_store_exactly_one() {
        let f = fixture();
        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let handler = f.handler.clone();
                let reference = format!("CC-{i}");
                tokio::spawn(async move {
                    let payload =
                        discovery_result("R1", Some(patient_with_care_contexts(&[&reference])));
                    (reference, handler.on_delivery(payload).unwrap())
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut duplicates = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                (reference, DeliveryReceipt::Stored { .. }) => winners.push(reference),
                (_, DeliveryReceipt::Duplicate) => duplicates += 1,
            }
        }

        assert_eq!(winners.len(), 1, "Exactly one delivery should be stored");
        assert_eq!(duplicates, 15);

        let record = f.store.get(&CorrelationKey::new("R1")).unwrap();
        let Outcome::Success(stored) = record.outcome else {
            unreachable!("racing deliveries were all valid");
        };
        let stored_reference = stored.patient.unwrap().care_contexts.unwrap()[0]
            .reference_number
            .clone();
        assert_eq!(stored_reference.as_deref(), Some(winners[0].as_str()));
    }

    #[test]
    fn valid_delivery_is_stored_as_success() {
        let f = fixture();
        let payload = discovery_result("R1", Some(patient_with_care_contexts(&["CC-1"])));

        let receipt = f.handler.on_delivery(payload).unwrap();

        assert_eq!(receipt, DeliveryReceipt::Stored { waiter_notified: false });
        let record = f.store.get(&CorrelationKey::new("R1")).unwrap();
        assert!(record.outcome.is_success());
    }

    #[test]
    fn invalid_delivery_is_stored_as_failure() {
        let f = fixture();
        let payload = discovery_result("R4", Some(patient_with_care_contexts(&[])));

        f.handler.on_delivery(payload).unwrap();

        let record = f.store.get(&CorrelationKey::new("R4")).unwrap();
        assert_eq!(
            record.outcome,
            Outcome::Failure {
                code: ErrorCode::InvalidDiscovery,
                message: MISSING_CARE_CONTEXTS.to_string(),
            }
        );
    }

    #[test]
    fn duplicate_delivery_keeps_first_record() {
        let f = fixture();
        f.handler
            .on_delivery(discovery_result("R1", Some(patient_with_care_contexts(&["CC-1"]))))
            .unwrap();

        let receipt = f
            .handler
            .on_delivery(discovery_result("R1", None))
            .unwrap();

        assert_eq!(receipt, DeliveryReceipt::Duplicate);
        assert!(f.store.get(&CorrelationKey::new("R1")).unwrap().outcome.is_success());
    }

    #[test]
    fn delivery_without_key_is_dropped() {
        let f = fixture();
        let mut payload = discovery_result("R1", Some(patient_with_care_contexts(&["CC-1"])));
        payload.resp = None;

        assert_eq!(f.handler.on_delivery(payload), Err(DeliveryError::Uncorrelated));
        assert!(f.store.is_empty());
    }

    #[test]
    fn blank_key_is_rejected() {
        let f = fixture();
        let payload = discovery_result("R1", Some(patient_with_care_contexts(&["CC-1"])));

        assert_eq!(
            f.handler.deliver(CorrelationKey::new("  "), payload),
            Err(DeliveryError::Uncorrelated)
        );
    }

    #[tokio::test]
    async fn registered_waiter_is_notified() {
        let f = fixture();
        let awaiter = crate::waiter::AwaitCompletion::new(
            Arc::new(f.store.clone()),
            Arc::clone(&f.waiters),
        );
        let handle = awaiter.register(CorrelationKey::new("R1")).unwrap();

        let receipt = f
            .handler
            .on_delivery(discovery_result("R1", Some(patient_with_care_contexts(&["CC-1"]))))
            .unwrap();

        assert_eq!(receipt, DeliveryReceipt::Stored { waiter_notified: true });
        drop(handle);
    }
}
