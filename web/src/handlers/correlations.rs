//! Read-only view of stored correlation records.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use callback_correlation_core::discovery::DiscoveryResult;
use callback_correlation_core::{CompletionRecord, CorrelationKey, DateTime, Outcome, Utc};
use serde::Serialize;

/// Failure part of a [`CorrelationView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureView {
    /// Reason code
    pub code: String,
    /// Human-readable description
    pub message: String,
}

/// A stored record as returned by the status route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationView {
    /// Key the record is stored under
    pub request_id: CorrelationKey,
    /// `SUCCESS` or `FAILURE`
    pub status: &'static str,
    /// When the callback arrived
    pub received_at: DateTime<Utc>,
    /// Delivered payload, for successes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DiscoveryResult>,
    /// Validation failure, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureView>,
}

impl From<CompletionRecord<DiscoveryResult>> for CorrelationView {
    fn from(record: CompletionRecord<DiscoveryResult>) -> Self {
        let (status, result, error) = match record.outcome {
            Outcome::Success(result) => ("SUCCESS", Some(result), None),
            Outcome::Failure { code, message } => (
                "FAILURE",
                None,
                Some(FailureView {
                    code: code.to_string(),
                    message,
                }),
            ),
        };
        Self {
            request_id: record.correlation_key,
            status,
            received_at: record.received_at,
            result,
            error,
        }
    }
}

/// Look up the record stored for a request id.
///
/// Late callbacks and callbacks that failed validation are visible here
/// until the retention window expires.
///
/// # Endpoint
///
/// ```text
/// GET /v1/correlations/{key}
/// ```
///
/// # Errors
///
/// `404` when nothing is stored for the key.
#[allow(clippy::unused_async)]
pub async fn get_correlation(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CorrelationView>, AppError> {
    let key = CorrelationKey::new(key);
    state
        .correlator
        .status(&key)
        .map(|record| Json(record.into()))
        .ok_or_else(|| AppError::not_found("Correlation", &key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback_correlation_core::ErrorCode;

    #[test]
    fn failure_record_view() {
        let record = CompletionRecord::<DiscoveryResult>::failure(
            CorrelationKey::new("R4"),
            ErrorCode::InvalidDiscovery,
            "Care contexts should not be null",
            Utc::now(),
        );

        let view = CorrelationView::from(record);

        assert_eq!(view.status, "FAILURE");
        assert!(view.result.is_none());
        assert_eq!(
            view.error,
            Some(FailureView {
                code: "INVALID_DISCOVERY".to_string(),
                message: "Care contexts should not be null".to_string(),
            })
        );
    }
}
