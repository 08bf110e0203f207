//! Completion records and the outcomes they carry.
//!
//! A [`CompletionRecord`] is what the inbound side writes for a key. It is a
//! tagged value, never an error: a delivery that fails validation still
//! produces a record, just a [`Outcome::Failure`] one, because the original
//! caller may no longer be listening.

use crate::key::CorrelationKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable reason attached to a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The delivery was structurally invalid.
    InvalidDiscovery,
    /// The delivery was well-formed but did not contain a usable answer.
    InvalidResponse,
    /// The provider itself reported an error with its own code.
    Provider(i32),
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDiscovery => write!(f, "INVALID_DISCOVERY"),
            Self::InvalidResponse => write!(f, "INVALID_RESPONSE"),
            Self::Provider(code) => write!(f, "PROVIDER_ERROR_{code}"),
        }
    }
}

/// Tagged result of a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome<P> {
    /// A structurally valid payload.
    Success(P),
    /// The delivery could not be accepted as an answer.
    Failure {
        /// Reason code
        code: ErrorCode,
        /// Human-readable description
        message: String,
    },
}

impl<P> Outcome<P> {
    /// Whether this outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Record written for a correlation key when a delivery arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord<P> {
    /// Key the delivery was correlated to
    pub correlation_key: CorrelationKey,
    /// What the delivery amounted to
    pub outcome: Outcome<P>,
    /// When the delivery was received
    pub received_at: DateTime<Utc>,
}

impl<P> CompletionRecord<P> {
    /// Build a success record.
    #[must_use]
    pub const fn success(
        correlation_key: CorrelationKey,
        payload: P,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_key,
            outcome: Outcome::Success(payload),
            received_at,
        }
    }

    /// Build a failure record.
    #[must_use]
    pub fn failure(
        correlation_key: CorrelationKey,
        code: ErrorCode,
        message: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_key,
            outcome: Outcome::Failure {
                code,
                message: message.into(),
            },
            received_at,
        }
    }
}

/// Caller-facing result of a correlated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainResult<T> {
    /// The provider answered and the answer was usable.
    Success(T),
    /// The provider answered with something that is not a usable answer.
    Failure {
        /// Reason code
        code: ErrorCode,
        /// Human-readable description
        message: String,
    },
    /// No valid delivery arrived before the deadline.
    TimedOut,
}

impl<T> DomainResult<T> {
    /// Whether the request resolved successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the request timed out.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_record_keeps_message() {
        let record: CompletionRecord<()> = CompletionRecord::failure(
            CorrelationKey::new("R4"),
            ErrorCode::InvalidDiscovery,
            "Care contexts should not be null",
            Utc::now(),
        );

        assert!(!record.outcome.is_success());
        assert_eq!(
            record.outcome,
            Outcome::Failure {
                code: ErrorCode::InvalidDiscovery,
                message: "Care contexts should not be null".to_string(),
            }
        );
    }

    #[test]
    fn error_code_display() {
        assert_eq!(ErrorCode::InvalidDiscovery.to_string(), "INVALID_DISCOVERY");
        assert_eq!(ErrorCode::Provider(1000).to_string(), "PROVIDER_ERROR_1000");
    }
}
