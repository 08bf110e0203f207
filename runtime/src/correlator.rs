//! Caller-facing correlation.
//!
//! [`Correlator::correlate`] composes the engine into a single call:
//!
//! ```text
//! reserve(id) ──▶ send(id, payload, destination) ──▶ wait(id, timeout) ──▶ translate
//!     │                      │                              │
//!  Conflict              SendError                TimedOut / Success / Failure
//! ```
//!
//! Reservation and send failures come back as errors. Everything that
//! happens after the request left is a [`DomainResult`].

use crate::CorrelationEngine;
use crate::error::CorrelationError;
use crate::ledger::Ledger;
use crate::metrics::CorrelationMetrics;
use crate::waiter::{AwaitCompletion, WaitOutcome};
use callback_correlation_core::{
    CompletionRecord, CorrelationKey, CorrelationStore, Destination, DomainResult,
    OutboundDispatcher, OwnerContext, RequestStatus, ResultTranslator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A request to correlate.
#[derive(Debug, Clone)]
pub struct CorrelatedRequest<Q> {
    /// Caller-supplied request id; also the correlation key
    pub id: CorrelationKey,
    /// Routing metadata persisted with the ledger entry
    pub owner: OwnerContext,
    /// Outbound payload, already carrying the id in protocol form
    pub payload: Q,
    /// Remote actor to send to
    pub destination: Destination,
}

impl<Q> CorrelatedRequest<Q> {
    /// Create a request.
    #[must_use]
    pub const fn new(
        id: CorrelationKey,
        owner: OwnerContext,
        payload: Q,
        destination: Destination,
    ) -> Self {
        Self {
            id,
            owner,
            payload,
            destination,
        }
    }
}

/// Issues correlated requests and waits for their out-of-band answers.
pub struct Correlator<Q, P, T> {
    ledger: Ledger,
    dispatcher: Arc<dyn OutboundDispatcher<Q>>,
    awaiter: AwaitCompletion<P>,
    store: Arc<dyn CorrelationStore<P>>,
    translator: T,
}

impl<Q, P, T: Clone> Clone for Correlator<Q, P, T> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            awaiter: self.awaiter.clone(),
            store: Arc::clone(&self.store),
            translator: self.translator.clone(),
        }
    }
}

impl<Q, P, T> Correlator<Q, P, T>
where
    Q: Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    T: ResultTranslator<P>,
{
    /// Create a correlator waiting on `engine`'s store and registry.
    #[must_use]
    pub fn new(
        engine: &CorrelationEngine<P>,
        ledger: Ledger,
        dispatcher: Arc<dyn OutboundDispatcher<Q>>,
        translator: T,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            awaiter: engine.awaiter(),
            store: engine.store(),
            translator,
        }
    }

    /// Send `request` and wait up to `timeout` for its delivery.
    ///
    /// A delivery that arrives after the deadline is still stored and can be
    /// read back with [`status`](Self::status), but does not change the
    /// result returned here.
    ///
    /// # Errors
    ///
    /// - [`CorrelationError::Conflict`] if the id was already reserved
    /// - [`CorrelationError::Send`] if the outbound call failed
    /// - [`CorrelationError::Ledger`] if the ledger could not be reached
    /// - [`CorrelationError::DuplicateWaiter`] if this process is already
    ///   waiting on the id
    #[tracing::instrument(
        skip(self, request),
        fields(correlation_key = %request.id, destination = %request.destination)
    )]
    pub async fn correlate(
        &self,
        request: CorrelatedRequest<Q>,
        timeout: Duration,
    ) -> Result<DomainResult<T::Output>, CorrelationError> {
        let CorrelatedRequest {
            id,
            owner,
            payload,
            destination,
        } = request;

        self.ledger.reserve(&id, owner).await?;

        if let Err(error) = self.dispatcher.send(&id, &payload, &destination).await {
            tracing::error!(error = %error, "Outbound send failed");
            CorrelationMetrics::record_send_error();
            self.ledger.finalize(&id, RequestStatus::Failed).await;
            return Err(CorrelationError::Send(error));
        }

        let started = Instant::now();
        let outcome = match self.awaiter.wait(id.clone(), timeout).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(error = %error, "Could not wait for delivery");
                self.ledger.finalize(&id, RequestStatus::Failed).await;
                return Err(error);
            }
        };
        let waited = started.elapsed();

        let result = match outcome {
            WaitOutcome::Completed(record) => self.translator.translate(record),
            WaitOutcome::TimedOut => DomainResult::TimedOut,
        };

        let (status, label) = match &result {
            DomainResult::Success(_) => (RequestStatus::Completed, "completed"),
            DomainResult::Failure { code, message } => {
                tracing::warn!(code = %code, message = %message, "Request resolved with failure");
                (RequestStatus::Failed, "failed")
            }
            DomainResult::TimedOut => {
                tracing::warn!(timeout_ms = timeout.as_millis(), "Request timed out");
                (RequestStatus::TimedOut, "timed_out")
            }
        };
        CorrelationMetrics::record_resolution(label, waited);
        self.ledger.finalize(&id, status).await;

        tracing::info!(outcome = label, waited_ms = waited.as_millis(), "Request resolved");
        Ok(result)
    }

    /// Read the stored record for `key`, including late and failed deliveries.
    #[must_use]
    pub fn status(&self, key: &CorrelationKey) -> Option<CompletionRecord<P>> {
        self.store.get(key)
    }

    /// The ledger this correlator reserves against.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}
