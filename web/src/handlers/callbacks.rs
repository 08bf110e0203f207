//! Gateway callback endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use callback_correlation_core::discovery::DiscoveryResult;
use callback_correlation_runtime::DeliveryReceipt;

/// Receive a provider's discovery result from the gateway.
///
/// Accepted deliveries answer `202` whether or not a caller was still
/// waiting, and so do duplicates: the gateway must not retry them.
///
/// # Endpoint
///
/// ```text
/// POST /v0.5/care-contexts/on-discover
/// ```
///
/// # Errors
///
/// - `422` when the payload does not echo an original request id
/// - `503` when the record cannot be stored
#[allow(clippy::unused_async)]
pub async fn on_discover(
    State(state): State<AppState>,
    Json(result): Json<DiscoveryResult>,
) -> Result<StatusCode, AppError> {
    match state.engine.handler().on_delivery(result)? {
        DeliveryReceipt::Stored { waiter_notified } => {
            tracing::debug!(waiter_notified, "Discovery callback accepted");
        }
        DeliveryReceipt::Duplicate => {
            tracing::debug!("Discovery callback already recorded");
        }
    }
    Ok(StatusCode::ACCEPTED)
}
