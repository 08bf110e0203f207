//! Record to caller-facing result mapping.

use crate::outcome::{CompletionRecord, DomainResult, Outcome};

/// Pure mapping from a completion record to the caller's result type.
///
/// Translators perform no I/O and cannot fail; anything that is not a usable
/// answer becomes [`DomainResult::Failure`].
pub trait ResultTranslator<P>: Send + Sync {
    /// Caller-facing success type.
    type Output;

    /// Translate a record.
    fn translate(&self, record: CompletionRecord<P>) -> DomainResult<Self::Output>;
}

/// Translator that hands the delivered payload through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl<P> ResultTranslator<P> for PassThrough {
    type Output = P;

    fn translate(&self, record: CompletionRecord<P>) -> DomainResult<P> {
        match record.outcome {
            Outcome::Success(payload) => DomainResult::Success(payload),
            Outcome::Failure { code, message } => DomainResult::Failure { code, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CorrelationKey;
    use crate::outcome::ErrorCode;
    use chrono::Utc;

    #[test]
    fn pass_through_keeps_payload() {
        let record = CompletionRecord::success(CorrelationKey::new("R1"), 42_u32, Utc::now());
        assert_eq!(PassThrough.translate(record), DomainResult::Success(42));
    }

    #[test]
    fn pass_through_keeps_failure() {
        let record: CompletionRecord<u32> = CompletionRecord::failure(
            CorrelationKey::new("R1"),
            ErrorCode::InvalidDiscovery,
            "Patient Details not found",
            Utc::now(),
        );
        assert_eq!(
            PassThrough.translate(record),
            DomainResult::Failure {
                code: ErrorCode::InvalidDiscovery,
                message: "Patient Details not found".to_string(),
            }
        );
    }
}
