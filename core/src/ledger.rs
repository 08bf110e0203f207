//! Durable request ledger.
//!
//! The ledger answers one question across restarts and across instances:
//! "has this request id been seen before?". Reserving an id inserts a
//! `pending` row; a duplicate id hits a uniqueness constraint and surfaces as
//! [`LedgerError::Conflict`] at the runtime layer. After the wait resolves the
//! row's status is updated for audit.
//!
//! # Implementations
//!
//! - `InMemoryLedgerStore` (testing crate) - single process, for tests
//! - `PostgresLedgerStore` (postgres crate) - production, `ON CONFLICT DO NOTHING`

use crate::key::CorrelationKey;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Reserved, waiting for a delivery
    Pending,
    /// Resolved with a successful delivery
    Completed,
    /// Resolved with a failure delivery (or the outbound send failed)
    Failed,
    /// No delivery arrived before the deadline
    TimedOut,
}

impl RequestStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(LedgerError::Storage(format!("Invalid request status: {s}"))),
        }
    }
}

/// Caller-defined metadata needed to route the eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnerContext {
    /// Who issued the request (e.g. the patient's user name)
    pub requester_id: String,
    /// Remote actor the request was sent to (e.g. the provider id)
    pub destination_id: String,
    /// Business transaction this request belongs to, if any
    pub transaction_id: Option<String>,
}

impl OwnerContext {
    /// Create an owner context.
    #[must_use]
    pub fn new(requester_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            destination_id: destination_id.into(),
            transaction_id: None,
        }
    }

    /// Attach a transaction id.
    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Request id, also the correlation key
    pub id: CorrelationKey,
    /// When the request was reserved
    pub created_at: DateTime<Utc>,
    /// Routing metadata
    pub owner: OwnerContext,
    /// Current status
    pub status: RequestStatus,
}

impl PendingRequest {
    /// Create a fresh `pending` entry.
    #[must_use]
    pub const fn new(id: CorrelationKey, owner: OwnerContext, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            owner,
            status: RequestStatus::Pending,
        }
    }
}

/// Errors from ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The id was already reserved (retry or replay)
    #[error("Request {0} already exists")]
    Conflict(CorrelationKey),

    /// No entry exists for the id
    #[error("Request {0} not found")]
    NotFound(CorrelationKey),

    /// The backing store failed
    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Persistence interface for the ledger.
///
/// Uses boxed futures so the store can be shared as `Arc<dyn LedgerStore>`.
/// Implementations must make `insert_if_absent` atomic across every process
/// that shares the backing storage.
pub trait LedgerStore: Send + Sync {
    /// Insert the entry unless its id already exists.
    ///
    /// Returns `true` if the row was inserted, `false` if the id was taken.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the backing store fails.
    fn insert_if_absent<'a>(
        &'a self,
        request: &'a PendingRequest,
    ) -> BoxFuture<'a, Result<bool, LedgerError>>;

    /// Update the status of an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no entry exists, or
    /// [`LedgerError::Storage`] if the backing store fails.
    fn update_status<'a>(
        &'a self,
        id: &'a CorrelationKey,
        status: RequestStatus,
    ) -> BoxFuture<'a, Result<(), LedgerError>>;

    /// Look up an entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the backing store fails.
    fn find<'a>(
        &'a self,
        id: &'a CorrelationKey,
    ) -> BoxFuture<'a, Result<Option<PendingRequest>, LedgerError>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn request_status_roundtrip() {
        for status in &[
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::TimedOut,
        ] {
            let parsed = RequestStatus::parse(status.as_str()).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn request_status_invalid() {
        assert!(RequestStatus::parse("cancelled").is_err());
    }

    #[test]
    fn new_entries_are_pending() {
        let request = PendingRequest::new(
            CorrelationKey::new("R1"),
            OwnerContext::new("user@ncg", "10000005").with_transaction_id("txn-1"),
            Utc::now(),
        );
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.owner.transaction_id.as_deref(), Some("txn-1"));
    }
}
