//! Correlation store abstraction.
//!
//! The rendezvous point between the inbound callback and the waiting caller.
//! Contract:
//!
//! - `put` is compare-and-insert per key: the first record wins and later ones
//!   come back as [`StoreError::AlreadyPresent`]
//! - `get` never returns an expired record
//! - records expire after the store's retention window whether or not anyone
//!   read them
//! - operations on distinct keys never contend on each other's results

use crate::key::CorrelationKey;
use crate::outcome::CompletionRecord;
use thiserror::Error;

/// Errors from correlation store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A live record already exists for this key
    #[error("Completion record for {0} already present")]
    AlreadyPresent(CorrelationKey),

    /// The store cannot be reached
    #[error("Correlation store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed cache of completion records with expiry.
pub trait CorrelationStore<P>: Send + Sync {
    /// Insert the record under its correlation key unless one is already live.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyPresent`] if a live record exists; the
    /// existing record is kept.
    fn put(&self, record: CompletionRecord<P>) -> Result<(), StoreError>;

    /// Fetch the live record for a key.
    fn get(&self, key: &CorrelationKey) -> Option<CompletionRecord<P>>;
}
