//! Outbound request dispatch.

use crate::key::CorrelationKey;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of the remote actor a request is sent to.
///
/// For the gateway protocol this is the provider's registry id, which the
/// gateway uses to route the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Create a destination.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the destination id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced synchronously by the outbound call.
///
/// Any of these aborts the correlation before a waiter is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Network or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The gateway answered the immediate call with a non-success status
    #[error("Request rejected (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The payload could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The destination is unusable
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

/// Sends a correlated request to a remote actor.
///
/// The payload must already carry the correlation key in whatever form the
/// protocol echoes back; the key is passed separately so dispatchers can log
/// and tag with it.
pub trait OutboundDispatcher<Q>: Send + Sync {
    /// Deliver the request.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] if the immediate call fails.
    fn send<'a>(
        &'a self,
        key: &'a CorrelationKey,
        payload: &'a Q,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<(), SendError>>;
}
