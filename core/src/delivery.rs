//! Inbound delivery contract.

use crate::key::CorrelationKey;
use crate::outcome::ErrorCode;

/// Why a delivery was turned into a failure record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Reason code stored on the failure record
    pub code: ErrorCode,
    /// Descriptive message stored on the failure record
    pub message: String,
}

impl Rejection {
    /// Create a rejection.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A payload delivered out of band in answer to an earlier request.
///
/// Implementors know how to find their own correlation key (the protocol's
/// echo-back request id) and which structural rules decide success vs failure.
pub trait Delivery: Clone + Send + Sync + 'static {
    /// Key this delivery answers, if the payload carries one.
    fn correlation_key(&self) -> Option<CorrelationKey>;

    /// Check structural well-formedness.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] describing the first violated rule.
    fn validate(&self) -> Result<(), Rejection>;
}
