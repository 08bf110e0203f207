//! Waiter registry and non-blocking wait.
//!
//! A caller that has sent its request registers a single-slot oneshot channel
//! under the correlation key, then races the receiving end against a timer.
//! The inbound handler stores the record first and signals second, and the
//! waiter registers first and checks the store second. Whichever side comes
//! last is guaranteed to see the other, so a delivery that lands between the
//! outbound send and the registration is never missed.
//!
//! ```text
//! handler:  put(record) ──▶ take sender ──▶ send(record)
//! waiter:   register    ──▶ get(key)    ──▶ select { receiver, sleep }
//! ```
//!
//! Dropping a [`WaitHandle`] (including dropping the future that owns it)
//! removes the registration, so abandoned callers release their slot.

use crate::error::CorrelationError;
use callback_correlation_core::{CompletionRecord, CorrelationKey, CorrelationStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

struct Slot<P> {
    ticket: u64,
    sender: oneshot::Sender<CompletionRecord<P>>,
}

/// Registry of suspended callers, keyed by correlation key.
pub struct WaiterRegistry<P> {
    waiters: Mutex<HashMap<CorrelationKey, Slot<P>>>,
    next_ticket: AtomicU64,
}

impl<P> Default for WaiterRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> WaiterRegistry<P> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Register a waiter for `key`.
    ///
    /// Returns the receiving end and the ticket identifying this registration.
    fn register(
        &self,
        key: &CorrelationKey,
    ) -> Result<(oneshot::Receiver<CompletionRecord<P>>, u64), CorrelationError> {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if waiters.contains_key(key) {
            return Err(CorrelationError::DuplicateWaiter(key.clone()));
        }

        let (sender, receiver) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        waiters.insert(key.clone(), Slot { ticket, sender });
        crate::metrics::CorrelationMetrics::record_pending_waiters(waiters.len());
        Ok((receiver, ticket))
    }

    /// Hand a record to the waiter registered for its key, if any.
    ///
    /// Returns `true` if a live waiter received the record.
    pub fn notify(&self, record: CompletionRecord<P>) -> bool {
        let slot = {
            let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = waiters.remove(&record.correlation_key);
            crate::metrics::CorrelationMetrics::record_pending_waiters(waiters.len());
            slot
        };

        slot.is_some_and(|slot| slot.sender.send(record).is_ok())
    }

    /// Remove the registration for `key` if it still belongs to `ticket`.
    fn deregister(&self, key: &CorrelationKey, ticket: u64) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if waiters.get(key).is_some_and(|slot| slot.ticket == ticket) {
            waiters.remove(key);
        }
        crate::metrics::CorrelationMetrics::record_pending_waiters(waiters.len());
    }

    /// Whether a waiter is registered for `key`.
    #[must_use]
    pub fn is_waiting(&self, key: &CorrelationKey) -> bool {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of registered waiters.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// How a wait resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<P> {
    /// A record arrived; its outcome may be a success or a failure.
    Completed(CompletionRecord<P>),
    /// The deadline passed first.
    TimedOut,
}

/// A registered, not yet resolved wait.
///
/// Deregisters itself on drop.
pub struct WaitHandle<P> {
    key: CorrelationKey,
    ticket: u64,
    receiver: oneshot::Receiver<CompletionRecord<P>>,
    registry: Arc<WaiterRegistry<P>>,
    store: Arc<dyn CorrelationStore<P>>,
}

impl<P> std::fmt::Debug for WaitHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitHandle")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl<P> WaitHandle<P> {
    /// Key this handle waits on.
    #[must_use]
    pub const fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Suspend until a record arrives or `timeout` elapses.
    ///
    /// The first event wins; a record that arrives after the deadline is left
    /// in the store for later lookups but does not change this result.
    pub async fn wait(mut self, timeout: Duration) -> WaitOutcome<P> {
        // The delivery may have landed before we registered
        if let Some(record) = self.store.get(&self.key) {
            return WaitOutcome::Completed(record);
        }

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        tokio::select! {
            biased;
            received = &mut self.receiver => {
                if let Ok(record) = received {
                    return WaitOutcome::Completed(record);
                }
            }
            () = &mut sleep => return WaitOutcome::TimedOut,
        }

        // Sender dropped without a record: fall back to the store, then the
        // rest of the deadline.
        if let Some(record) = self.store.get(&self.key) {
            return WaitOutcome::Completed(record);
        }
        sleep.await;
        WaitOutcome::TimedOut
    }
}

impl<P> Drop for WaitHandle<P> {
    fn drop(&mut self) {
        self.registry.deregister(&self.key, self.ticket);
    }
}

/// Wait side of the engine.
pub struct AwaitCompletion<P> {
    store: Arc<dyn CorrelationStore<P>>,
    registry: Arc<WaiterRegistry<P>>,
}

impl<P> Clone for AwaitCompletion<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P> AwaitCompletion<P> {
    /// Create the wait side over a shared store and registry.
    #[must_use]
    pub const fn new(store: Arc<dyn CorrelationStore<P>>, registry: Arc<WaiterRegistry<P>>) -> Self {
        Self { store, registry }
    }

    /// Register interest in `key` without suspending yet.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateWaiter`] if this process already
    /// has a waiter for `key`.
    pub fn register(&self, key: CorrelationKey) -> Result<WaitHandle<P>, CorrelationError> {
        let (receiver, ticket) = self.registry.register(&key)?;
        Ok(WaitHandle {
            key,
            ticket,
            receiver,
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
        })
    }

    /// Register and suspend until a record arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateWaiter`] if this process already
    /// has a waiter for `key`.
    pub async fn wait(
        &self,
        key: CorrelationKey,
        timeout: Duration,
    ) -> Result<WaitOutcome<P>, CorrelationError> {
        let handle = self.register(key)?;
        Ok(handle.wait(timeout).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use crate::store::InMemoryCorrelationStore;
    use chrono::Utc;

    fn awaiter() -> (AwaitCompletion<String>, Arc<WaiterRegistry<String>>, InMemoryCorrelationStore<String>) {
        let store = InMemoryCorrelationStore::new(Duration::from_secs(300));
        let registry = Arc::new(WaiterRegistry::new());
        let awaiter = AwaitCompletion::new(Arc::new(store.clone()), Arc::clone(&registry));
        (awaiter, registry, store)
    }

    fn record(key: &str) -> CompletionRecord<String> {
        CompletionRecord::success(CorrelationKey::new(key), "payload".to_string(), Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn notify_wakes_the_waiter() {
        let (awaiter, registry, _store) = awaiter();
        let handle = awaiter.register(CorrelationKey::new("R1")).unwrap();

        assert!(registry.notify(record("R1")));
        match handle.wait(Duration::from_secs(5)).await {
            WaitOutcome::Completed(r) => assert_eq!(r.correlation_key, CorrelationKey::new("R1")),
            WaitOutcome::TimedOut => panic!("expected completion"),
        }
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn wait_stays_pending_until_notified() {
        let (awaiter, registry, _store) = awaiter();
        let handle = awaiter.register(CorrelationKey::new("R1")).unwrap();
        let mut wait = tokio_test::task::spawn(handle.wait(Duration::from_secs(5)));

        tokio_test::assert_pending!(wait.poll());
        assert!(registry.notify(record("R1")));
        assert!(wait.is_woken());

        let outcome = tokio_test::assert_ready!(wait.poll());
        assert!(matches!(outcome, WaitOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_delivery() {
        let (awaiter, registry, _store) = awaiter();
        let started = tokio::time::Instant::now();

        let outcome = awaiter
            .wait(CorrelationKey::new("R2"), Duration::from_millis(5000))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5050));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn record_stored_before_registration_is_seen() {
        let (awaiter, _registry, store) = awaiter();
        store.put(record("R1")).unwrap();

        let outcome = awaiter
            .wait(CorrelationKey::new("R1"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, WaitOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn duplicate_waiter_is_rejected() {
        let (awaiter, _registry, _store) = awaiter();
        let _first = awaiter.register(CorrelationKey::new("R1")).unwrap();

        let err = awaiter.register(CorrelationKey::new("R1")).unwrap_err();
        assert_eq!(err, CorrelationError::DuplicateWaiter(CorrelationKey::new("R1")));
    }

    #[tokio::test]
    async fn dropping_the_handle_releases_the_slot() {
        let (awaiter, registry, _store) = awaiter();
        let handle = awaiter.register(CorrelationKey::new("R1")).unwrap();
        assert!(registry.is_waiting(&CorrelationKey::new("R1")));

        drop(handle);

        assert!(!registry.is_waiting(&CorrelationKey::new("R1")));
        assert!(!registry.notify(record("R1")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_releases_the_slot() {
        let (awaiter, registry, _store) = awaiter();
        let task = {
            let awaiter = awaiter.clone();
            tokio::spawn(async move {
                awaiter
                    .wait(CorrelationKey::new("R1"), Duration::from_secs(60))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.pending_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn stale_ticket_does_not_remove_new_registration() {
        let registry = WaiterRegistry::<String>::new();
        let key = CorrelationKey::new("R1");
        let (_rx1, first) = registry.register(&key).unwrap();
        assert!(registry.notify(record("R1")));

        let (_rx2, _second) = registry.register(&key).unwrap();
        registry.deregister(&key, first);

        assert!(registry.is_waiting(&key));
    }
}
