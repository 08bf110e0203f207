//! Care-context discovery endpoint.

use crate::error::{AppError, resolve};
use crate::state::AppState;
use axum::{Json, extract::State};
use callback_correlation_core::discovery::{DiscoveryRequest, DiscoveryResponse, PatientQuery};
use callback_correlation_core::{CorrelationKey, Destination, OwnerContext, Utc};
use callback_correlation_runtime::CorrelatedRequest;
use serde::Deserialize;

/// Body of a discovery request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverPatientRequest {
    /// Request id; generated when absent
    #[serde(default)]
    pub request_id: Option<CorrelationKey>,
    /// Business transaction id
    pub transaction_id: String,
    /// Provider to ask
    pub hip_id: String,
    /// Patient to look for
    pub patient: PatientQuery,
}

/// Ask a provider for a patient's care contexts and wait for its callback.
///
/// # Endpoint
///
/// ```text
/// POST /v1/care-contexts/discover
/// ```
///
/// # Errors
///
/// - `409` when the request id was already used
/// - `404` when the provider reports it could not find the patient
/// - `502` when the gateway refuses the request or the callback is invalid
/// - `504` when no callback arrives in time
pub async fn discover(
    State(state): State<AppState>,
    Json(body): Json<DiscoverPatientRequest>,
) -> Result<Json<DiscoveryResponse>, AppError> {
    let id = body
        .request_id
        .filter(|id| !id.is_blank())
        .unwrap_or_else(CorrelationKey::generate);

    let owner = OwnerContext::new(body.patient.id.clone(), body.hip_id.clone())
        .with_transaction_id(body.transaction_id.clone());
    let payload = DiscoveryRequest {
        request_id: id.clone(),
        timestamp: Utc::now(),
        transaction_id: body.transaction_id,
        patient: body.patient,
    };
    let request = CorrelatedRequest::new(id, owner, payload, Destination::new(body.hip_id));

    let result = state
        .correlator
        .correlate(request, state.txn_timeout)
        .await?;

    resolve(result).map(Json)
}
