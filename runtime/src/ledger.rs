//! Reserve/finalize over a [`LedgerStore`].

use crate::metrics::CorrelationMetrics;
use callback_correlation_core::environment::Clock;
use callback_correlation_core::{
    CorrelationKey, LedgerError, LedgerStore, OwnerContext, PendingRequest, RequestStatus,
};
use std::sync::Arc;

/// Request ledger.
///
/// `reserve` is the only cross-instance mutual exclusion in the engine: the
/// backing store's uniqueness guarantee decides which of two concurrent
/// callers owns an id. `finalize` is best-effort audit.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reserve `id` as a new pending request.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if `id` was already reserved, or
    /// [`LedgerError::Storage`] if the store failed.
    pub async fn reserve(
        &self,
        id: &CorrelationKey,
        owner: OwnerContext,
    ) -> Result<PendingRequest, LedgerError> {
        let request = PendingRequest::new(id.clone(), owner, self.clock.now());

        if self.store.insert_if_absent(&request).await? {
            tracing::debug!(correlation_key = %id, "Reserved request id");
            Ok(request)
        } else {
            tracing::warn!(correlation_key = %id, "Request id already exists");
            CorrelationMetrics::record_conflict();
            Err(LedgerError::Conflict(id.clone()))
        }
    }

    /// Record the final status of `id`.
    ///
    /// Failures are logged and swallowed; the caller's result never depends
    /// on this write.
    pub async fn finalize(&self, id: &CorrelationKey, status: RequestStatus) {
        match self.store.update_status(id, status).await {
            Ok(()) => {
                tracing::debug!(correlation_key = %id, status = status.as_str(), "Finalized request");
            }
            Err(error) => {
                tracing::warn!(
                    correlation_key = %id,
                    status = status.as_str(),
                    error = %error,
                    "Failed to finalize request status"
                );
                CorrelationMetrics::record_finalize_error();
            }
        }
    }

    /// Look up a ledger entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store failed.
    pub async fn find(&self, id: &CorrelationKey) -> Result<Option<PendingRequest>, LedgerError> {
        self.store.find(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use callback_correlation_testing::mocks::InMemoryLedgerStore;
    use callback_correlation_testing::test_clock;

    fn ledger(store: &InMemoryLedgerStore) -> Ledger {
        Ledger::new(Arc::new(store.clone()), Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn second_reserve_conflicts() {
        let store = InMemoryLedgerStore::new();
        let ledger = ledger(&store);
        let id = CorrelationKey::new("R3");

        let first = ledger.reserve(&id, OwnerContext::new("alice", "hip-1")).await.unwrap();
        assert_eq!(first.status, RequestStatus::Pending);

        let err = ledger
            .reserve(&id, OwnerContext::new("bob", "hip-2"))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Conflict(id.clone()));

        // The original owner is kept
        let stored = ledger.find(&id).await.unwrap().unwrap();
        assert_eq!(stored.owner.requester_id, "alice");
    }

    #[tokio::test]
    async fn concurrent_reserves_yield_one_winner() {
        let store = InMemoryLedgerStore::new();
        let ledger = ledger(&store);
        let id = CorrelationKey::new("R-concurrent");

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    ledger.reserve(&id, OwnerContext::new(format!("u{i}"), "hip")).await
                })
            })
            .collect();

        let mut won = 0;
        let mut conflicted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => won += 1,
                Err(LedgerError::Conflict(_)) => conflicted += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(conflicted, 15);
    }

    #[tokio::test]
    async fn finalize_updates_status() {
        let store = InMemoryLedgerStore::new();
        let ledger = ledger(&store);
        let id = CorrelationKey::new("R1");
        ledger.reserve(&id, OwnerContext::default()).await.unwrap();

        ledger.finalize(&id, RequestStatus::Completed).await;

        assert_eq!(store.status_of(&id), Some(RequestStatus::Completed));
    }

    #[tokio::test]
    async fn finalize_failure_is_not_fatal() {
        let store = InMemoryLedgerStore::new().with_failing_updates();
        let ledger = ledger(&store);
        let id = CorrelationKey::new("R1");
        ledger.reserve(&id, OwnerContext::default()).await.unwrap();

        ledger.finalize(&id, RequestStatus::TimedOut).await;

        assert_eq!(store.status_of(&id), Some(RequestStatus::Pending));
    }
}
