//! Care-context discovery payloads.
//!
//! The requester asks a provider, through the gateway, whether it holds
//! records for a patient. The provider answers later on the
//! `on-discover` callback with a [`DiscoveryResult`] that echoes the original
//! request id in `resp.requestId`. That echo is the correlation key.
//!
//! # Shape rules
//!
//! A result is accepted as a success only when:
//!
//! 1. a patient is present
//! 2. the patient reference is non-blank
//! 3. the care-context collection is present and non-empty
//! 4. every care context carries a non-blank reference
//!
//! The first violated rule becomes a failure record with a fixed message.

use crate::delivery::{Delivery, Rejection};
use crate::key::CorrelationKey;
use crate::outcome::{CompletionRecord, DomainResult, ErrorCode, Outcome};
use crate::translate::ResultTranslator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message stored when the result has no patient.
pub const PATIENT_NOT_FOUND: &str = "Patient Details not found";
/// Message stored when the patient reference is blank.
pub const BLANK_PATIENT_REFERENCE: &str = "Patient Reference should not be blank";
/// Message stored when the care-context collection is null or empty.
pub const MISSING_CARE_CONTEXTS: &str = "Care contexts should not be null";
/// Message stored when a care context has a blank reference.
pub const INVALID_CARE_CONTEXT_REFERENCES: &str =
    "All the care contexts should have valid references";
/// Message returned when a valid result carries neither a patient nor an error.
pub const INVALID_PROVIDER_RESPONSE: &str = "Invalid response from provider";

/// Identifier used to look a patient up at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Identifier type (e.g. `MOBILE`, `MR`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Identifier value
    pub value: String,
}

/// Patient demographics sent with a discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    /// Consent-manager user id
    pub id: String,
    /// Full name
    pub name: String,
    /// Gender code
    pub gender: String,
    /// Year of birth
    pub year_of_birth: Option<i32>,
    /// Identifiers the consent manager has verified
    pub verified_identifiers: Vec<Identifier>,
    /// Identifiers supplied by the user and not verified
    pub unverified_identifiers: Vec<Identifier>,
}

/// Outbound discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    /// Request id; the provider echoes it back in `resp.requestId`
    pub request_id: CorrelationKey,
    /// When the request was created
    pub timestamp: DateTime<Utc>,
    /// Business transaction id
    pub transaction_id: String,
    /// Patient to look for
    pub patient: PatientQuery,
}

/// A care context (an episode or visit) held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareContext {
    /// Provider reference for the care context
    pub reference_number: Option<String>,
    /// Display text
    pub display: Option<String>,
}

/// Patient the provider matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Provider reference for the patient
    pub reference_number: Option<String>,
    /// Display name
    pub display: Option<String>,
    /// Care contexts linked to the patient
    pub care_contexts: Option<Vec<CareContext>>,
    /// Which identifiers the match was made on
    #[serde(default)]
    pub matched_by: Vec<String>,
}

/// Error reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider error code
    pub code: i32,
    /// Provider error message
    pub message: String,
}

/// Gateway envelope echoing the original request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// Id of the request this callback answers
    pub request_id: Option<String>,
}

/// Callback payload delivered by the gateway on `on-discover`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Id of this callback message (not the correlation key)
    pub request_id: Option<String>,
    /// When the provider produced the result
    pub timestamp: Option<DateTime<Utc>>,
    /// Business transaction id
    pub transaction_id: Option<String>,
    /// Matched patient, if any
    pub patient: Option<PatientRecord>,
    /// Provider-reported error, if any
    pub error: Option<ProviderError>,
    /// Echo of the original request
    pub resp: Option<GatewayResponse>,
}

impl DiscoveryResult {
    fn has_blank_care_context_reference(contexts: &[CareContext]) -> bool {
        contexts.iter().any(|context| is_blank(context.reference_number.as_deref()))
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

impl Delivery for DiscoveryResult {
    fn correlation_key(&self) -> Option<CorrelationKey> {
        self.resp
            .as_ref()
            .and_then(|resp| resp.request_id.as_deref())
            .filter(|id| !id.trim().is_empty())
            .map(CorrelationKey::from)
    }

    fn validate(&self) -> Result<(), Rejection> {
        let reject = |message| Err(Rejection::new(ErrorCode::InvalidDiscovery, message));

        let Some(patient) = &self.patient else {
            return reject(PATIENT_NOT_FOUND);
        };
        if is_blank(patient.reference_number.as_deref()) {
            return reject(BLANK_PATIENT_REFERENCE);
        }
        let Some(care_contexts) = &patient.care_contexts else {
            return reject(MISSING_CARE_CONTEXTS);
        };
        if care_contexts.is_empty() {
            return reject(MISSING_CARE_CONTEXTS);
        }
        if Self::has_blank_care_context_reference(care_contexts) {
            return reject(INVALID_CARE_CONTEXT_REFERENCES);
        }
        Ok(())
    }
}

/// Caller-facing discovery answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    /// Matched patient with care contexts
    pub patient: PatientRecord,
    /// Transaction the answer belongs to
    pub transaction_id: Option<String>,
}

/// Maps discovery records to [`DiscoveryResponse`].
///
/// A provider-reported error wins over any patient in the same payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryTranslator;

impl ResultTranslator<DiscoveryResult> for DiscoveryTranslator {
    type Output = DiscoveryResponse;

    fn translate(&self, record: CompletionRecord<DiscoveryResult>) -> DomainResult<DiscoveryResponse> {
        match record.outcome {
            Outcome::Failure { code, message } => DomainResult::Failure { code, message },
            Outcome::Success(result) => {
                if let Some(error) = result.error {
                    return DomainResult::Failure {
                        code: ErrorCode::Provider(error.code),
                        message: error.message,
                    };
                }
                match result.patient {
                    Some(patient) => DomainResult::Success(DiscoveryResponse {
                        patient,
                        transaction_id: result.transaction_id,
                    }),
                    None => DomainResult::Failure {
                        code: ErrorCode::InvalidResponse,
                        message: INVALID_PROVIDER_RESPONSE.to_string(),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn care_context(reference: Option<&str>) -> CareContext {
        CareContext {
            reference_number: reference.map(str::to_string),
            display: Some("Visit".to_string()),
        }
    }

    fn result_with(patient: Option<PatientRecord>) -> DiscoveryResult {
        DiscoveryResult {
            request_id: Some("callback-1".to_string()),
            timestamp: None,
            transaction_id: Some("txn-1".to_string()),
            patient,
            error: None,
            resp: Some(GatewayResponse {
                request_id: Some("R1".to_string()),
            }),
        }
    }

    fn patient(reference: Option<&str>, contexts: Option<Vec<CareContext>>) -> PatientRecord {
        PatientRecord {
            reference_number: reference.map(str::to_string),
            display: Some("John Doe".to_string()),
            care_contexts: contexts,
            matched_by: vec!["MOBILE".to_string()],
        }
    }

    fn rejection_message(result: &DiscoveryResult) -> String {
        result.validate().expect_err("should be rejected").message
    }

    #[test]
    fn valid_result_passes() {
        let result = result_with(Some(patient(
            Some("PAT-1"),
            Some(vec![care_context(Some("CC-1")), care_context(Some("CC-2"))]),
        )));
        assert!(result.validate().is_ok());
    }

    #[test]
    fn missing_patient_is_rejected() {
        assert_eq!(rejection_message(&result_with(None)), PATIENT_NOT_FOUND);
    }

    #[test]
    fn blank_patient_reference_is_rejected() {
        let contexts = Some(vec![care_context(Some("CC-1"))]);
        for reference in [None, Some(""), Some("  ")] {
            let result = result_with(Some(patient(reference, contexts.clone())));
            assert_eq!(rejection_message(&result), BLANK_PATIENT_REFERENCE);
        }
    }

    #[test]
    fn null_care_contexts_are_rejected() {
        let result = result_with(Some(patient(Some("PAT-1"), None)));
        assert_eq!(rejection_message(&result), MISSING_CARE_CONTEXTS);
    }

    #[test]
    fn empty_care_contexts_are_rejected() {
        let result = result_with(Some(patient(Some("PAT-1"), Some(vec![]))));
        assert_eq!(rejection_message(&result), MISSING_CARE_CONTEXTS);
    }

    #[test]
    fn care_context_without_reference_is_rejected() {
        let result = result_with(Some(patient(
            Some("PAT-1"),
            Some(vec![care_context(Some("CC-1")), care_context(None)]),
        )));
        assert_eq!(rejection_message(&result), INVALID_CARE_CONTEXT_REFERENCES);
    }

    #[test]
    fn correlation_key_comes_from_resp() {
        let result = result_with(None);
        assert_eq!(result.correlation_key(), Some(CorrelationKey::new("R1")));

        let mut orphan = result_with(None);
        orphan.resp = None;
        assert_eq!(orphan.correlation_key(), None);

        orphan.resp = Some(GatewayResponse {
            request_id: Some(" ".to_string()),
        });
        assert_eq!(orphan.correlation_key(), None);
    }

    #[test]
    fn deserializes_gateway_json() {
        let json = serde_json::json!({
            "requestId": "5f7a535d-a3fd-416b-b069-c97d021fbacd",
            "timestamp": "2020-06-01T12:00:00Z",
            "transactionId": "txn-1",
            "patient": {
                "referenceNumber": "PAT-1",
                "display": "John Doe",
                "careContexts": [{"referenceNumber": "CC-1", "display": "Visit"}],
                "matchedBy": ["MOBILE"]
            },
            "error": null,
            "resp": {"requestId": "R1"}
        });

        let result: DiscoveryResult = serde_json::from_value(json).expect("valid payload");
        assert!(result.validate().is_ok());
        assert_eq!(result.correlation_key(), Some(CorrelationKey::new("R1")));
    }

    #[test]
    fn translator_maps_provider_error_to_failure() {
        let mut result = result_with(None);
        result.error = Some(ProviderError {
            code: 1000,
            message: "Could not find patient".to_string(),
        });
        let record = CompletionRecord::success(CorrelationKey::new("R1"), result, Utc::now());

        assert_eq!(
            DiscoveryTranslator.translate(record),
            DomainResult::Failure {
                code: ErrorCode::Provider(1000),
                message: "Could not find patient".to_string(),
            }
        );
    }

    #[test]
    fn translator_maps_patient_to_success() {
        let matched = patient(Some("PAT-1"), Some(vec![care_context(Some("CC-1"))]));
        let record = CompletionRecord::success(
            CorrelationKey::new("R1"),
            result_with(Some(matched.clone())),
            Utc::now(),
        );

        assert_eq!(
            DiscoveryTranslator.translate(record),
            DomainResult::Success(DiscoveryResponse {
                patient: matched,
                transaction_id: Some("txn-1".to_string()),
            })
        );
    }

    proptest! {
        #[test]
        fn any_blank_care_context_reference_is_never_a_success(
            references in proptest::collection::vec(proptest::option::of("[A-Z0-9 ]{0,6}"), 1..8)
        ) {
            let contexts: Vec<CareContext> = references
                .iter()
                .map(|r| care_context(r.as_deref()))
                .collect();
            let any_blank = references.iter().any(|r| is_blank(r.as_deref()));
            let result = result_with(Some(patient(Some("PAT-1"), Some(contexts))));

            prop_assert_eq!(result.validate().is_err(), any_blank);
        }
    }
}
