//! Error types for web handlers.
//!
//! Bridges correlation errors and unresolved results to HTTP responses by
//! implementing Axum's `IntoResponse` trait.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use callback_correlation_core::{DomainResult, ErrorCode};
use callback_correlation_runtime::{CorrelationError, DeliveryError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Carries the status, a client-facing code and message, and optionally the
/// internal error for logging.
///
/// # Examples
///
/// ```ignore
/// async fn handler(Path(key): Path<String>) -> Result<Json<CorrelationView>, AppError> {
///     let record = store.get(&key.into())
///         .ok_or_else(|| AppError::not_found("Correlation", &key))?;
///     Ok(Json(record.into()))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Attach the internal error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, "CONFLICT")
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "UNPROCESSABLE_ENTITY")
    }

    /// Create a 502 Bad Gateway error.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message, code)
    }

    /// Create a 504 Gateway Timeout error.
    #[must_use]
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message, "GATEWAY_TIMEOUT")
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }
}

/// Unwrap a resolved result, mapping anything but success to an error.
///
/// - provider-reported error or a callback that failed the shape rules
///   (a provider that cannot find the patient sends no patient): 404
/// - a valid callback with neither patient nor error: 502
/// - no delivery before the deadline: 504
///
/// # Errors
///
/// Returns the mapped [`AppError`] for `Failure` and `TimedOut`.
pub fn resolve<T>(result: DomainResult<T>) -> Result<T, AppError> {
    match result {
        DomainResult::Success(value) => Ok(value),
        DomainResult::Failure {
            code: code @ (ErrorCode::Provider(_) | ErrorCode::InvalidDiscovery),
            message,
        } => Err(AppError::new(StatusCode::NOT_FOUND, message, code.to_string())),
        DomainResult::Failure { code, message } => {
            Err(AppError::bad_gateway(message, code.to_string()))
        }
        DomainResult::TimedOut => Err(AppError::gateway_timeout(
            "No response from provider before the deadline",
        )),
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<CorrelationError> for AppError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::Conflict(key) => {
                Self::conflict(format!("Request {key} already exists"))
            }
            CorrelationError::DuplicateWaiter(key) => {
                Self::conflict(format!("Request {key} is already being awaited"))
            }
            err @ CorrelationError::Send(_) => {
                Self::bad_gateway("Gateway did not accept the request", "GATEWAY_ERROR")
                    .with_source(anyhow::Error::new(err))
            }
            err @ CorrelationError::Ledger(_) => {
                Self::unavailable("Request ledger unavailable").with_source(anyhow::Error::new(err))
            }
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Uncorrelated => {
                Self::unprocessable("Callback does not reference an original request id")
            }
            err @ DeliveryError::Store(_) => {
                Self::unavailable("Could not record callback").with_source(anyhow::Error::new(err))
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use callback_correlation_core::{CorrelationKey, SendError};

    #[test]
    fn test_error_display() {
        let err = AppError::conflict("Request R3 already exists");
        assert_eq!(err.to_string(), "[CONFLICT] Request R3 already exists");
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = AppError::from(CorrelationError::Conflict(CorrelationKey::new("R3")));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_send_error_maps_to_502() {
        let err = AppError::from(CorrelationError::Send(SendError::Transport("refused".into())));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_uncorrelated_delivery_maps_to_422() {
        let err = AppError::from(DeliveryError::Uncorrelated);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_resolve_mapping() {
        assert_eq!(resolve(DomainResult::Success(1)).ok(), Some(1));

        let timed_out = resolve::<u8>(DomainResult::TimedOut).unwrap_err();
        assert_eq!(timed_out.status(), StatusCode::GATEWAY_TIMEOUT);

        let provider = resolve::<u8>(DomainResult::Failure {
            code: ErrorCode::Provider(1000),
            message: "Could not find the patient".into(),
        })
        .unwrap_err();
        assert_eq!(provider.status(), StatusCode::NOT_FOUND);
        assert_eq!(provider.code(), "PROVIDER_ERROR_1000");

        let invalid = resolve::<u8>(DomainResult::Failure {
            code: ErrorCode::InvalidDiscovery,
            message: "Patient Details not found".into(),
        })
        .unwrap_err();
        assert_eq!(invalid.status(), StatusCode::NOT_FOUND);
        assert_eq!(invalid.code(), "INVALID_DISCOVERY");

        let unusable = resolve::<u8>(DomainResult::Failure {
            code: ErrorCode::InvalidResponse,
            message: "Invalid response from provider".into(),
        })
        .unwrap_err();
        assert_eq!(unusable.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(unusable.code(), "INVALID_RESPONSE");
    }
}
