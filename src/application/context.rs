use super::locks::KeyedLocks;
use crate::domain::payment::Payment;
use crate::domain::ports::{PublisherRef, SagaStoreRef, WriteOutcome};
use crate::error::{PaymentError, Result};
use std::sync::Arc;

/// Collaborators shared by every saga component.
#[derive(Clone)]
pub struct SagaContext {
    pub store: SagaStoreRef,
    pub publisher: PublisherRef,
    pub locks: Arc<KeyedLocks>,
    pub ttl_secs: u64,
}

impl SagaContext {
    pub fn new(store: SagaStoreRef, publisher: PublisherRef, ttl_secs: u64) -> Self {
        Self {
            store,
            publisher,
            locks: Arc::new(KeyedLocks::new()),
            ttl_secs,
        }
    }

    pub async fn load(&self, request_id: &str) -> Result<Payment> {
        self.store
            .get(request_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {request_id}")))
    }

    /// Writes `payment` if nobody else wrote since it was loaded.
    ///
    /// On a lost race the write is dropped and the record that won is
    /// returned instead, so callers always see what is actually stored.
    pub async fn commit(&self, mut payment: Payment) -> Result<Committed> {
        let expected = payment.version;
        payment.version += 1;
        match self.store.update(&payment, expected).await? {
            WriteOutcome::Applied => Ok(Committed::Applied(payment)),
            WriteOutcome::Conflict => {
                tracing::debug!(request_id = %payment.request_id, "Discarding update that lost a concurrent write");
                Ok(Committed::Discarded(self.load(&payment.request_id).await?))
            }
        }
    }
}

/// Outcome of [`SagaContext::commit`].
#[derive(Debug)]
pub enum Committed {
    Applied(Payment),
    Discarded(Payment),
}

impl Committed {
    pub fn into_payment(self) -> Payment {
        match self {
            Committed::Applied(p) | Committed::Discarded(p) => p,
        }
    }
}
