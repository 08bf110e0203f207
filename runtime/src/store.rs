//! Expiring in-memory correlation store.
//!
//! Records live for a fixed retention window measured from the moment they
//! were written. Expired entries are invisible to `get` immediately and are
//! physically removed by [`InMemoryCorrelationStore::purge_expired`], either
//! on demand or from a background sweeper.

use callback_correlation_core::{CompletionRecord, CorrelationKey, CorrelationStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Entry<P> {
    record: CompletionRecord<P>,
    expires_at: Instant,
}

impl<P> Entry<P> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// `HashMap`-backed [`CorrelationStore`] with a retention window.
///
/// Cloning shares the underlying map.
pub struct InMemoryCorrelationStore<P> {
    entries: Arc<RwLock<HashMap<CorrelationKey, Entry<P>>>>,
    retention: Duration,
}

impl<P> Clone for InMemoryCorrelationStore<P> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            retention: self.retention,
        }
    }
}

impl<P: Clone + Send + Sync + 'static> InMemoryCorrelationStore<P> {
    /// Create a store whose records expire `retention` after being written.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Retention window.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of entries physically held, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();

        crate::metrics::CorrelationMetrics::record_store_size(entries.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Purged expired completion records");
        }
        removed
    }

    /// Spawn a background task that purges expired entries every `interval`.
    ///
    /// The task stops when the returned handle is dropped.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        });

        tracing::info!(interval_ms = interval.as_millis(), "Started correlation store sweeper");
        SweeperHandle {
            handle: Some(handle),
        }
    }
}

impl<P: Clone + Send + Sync + 'static> CorrelationStore<P> for InMemoryCorrelationStore<P> {
    fn put(&self, record: CompletionRecord<P>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.get(&record.correlation_key).is_some_and(|e| e.is_live(now)) {
            return Err(StoreError::AlreadyPresent(record.correlation_key));
        }

        entries.insert(
            record.correlation_key.clone(),
            Entry {
                record,
                expires_at: now + self.retention,
            },
        );
        crate::metrics::CorrelationMetrics::record_store_size(entries.len());
        Ok(())
    }

    fn get(&self, key: &CorrelationKey) -> Option<CompletionRecord<P>> {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.record.clone())
    }
}

/// Handle to a running sweeper; aborts the task on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
