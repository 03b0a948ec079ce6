use super::context::{Committed, SagaContext};
use crate::domain::events::SubmitPayment;
use crate::domain::payment::Payment;
use crate::domain::state::PaymentStatus;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};

/// Opens new sagas and starts new generations of unfinished ones.
pub struct SubmissionService {
    ctx: SagaContext,
}

impl SubmissionService {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    /// Accepts `request` as of `now`.
    ///
    /// A finished request id is never reopened. An unfinished one gets a new
    /// generation in `REPROCESSING` with its checks reset, keeping its
    /// storage key and creation time.
    pub async fn submit(&self, request: SubmitPayment, now: DateTime<Utc>) -> Result<Payment> {
        request.validate()?;
        for account in [&request.payer, &request.payee] {
            if self.ctx.store.get_account(account).await?.is_none() {
                return Err(PaymentError::NotFound(format!("account {account}")));
            }
        }

        let _guard = self.ctx.locks.lock(&request.request_id).await;
        let payment = match self.ctx.store.get(&request.request_id).await? {
            None => {
                let payment = self.ctx.store.insert(Payment::new(&request, now)?).await?;
                tracing::info!(
                    request_id = %payment.request_id,
                    amount = %payment.amount,
                    payer = %payment.payer,
                    payee = %payment.payee,
                    "Payment submitted"
                );
                payment
            }
            Some(existing) => self.resubmit(existing, &request).await?,
        };

        self.ctx.publisher.publish_saga_outcome(&payment).await;
        Ok(payment)
    }

    async fn resubmit(&self, mut existing: Payment, request: &SubmitPayment) -> Result<Payment> {
        if existing.payer != request.payer {
            return Err(PaymentError::ValidationError(format!(
                "Request id {} belongs to another payer",
                request.request_id
            )));
        }
        let was_waiting = existing.status == PaymentStatus::WaitingForUserConfirmation;
        existing.regenerate(request)?;

        match self.ctx.commit(existing).await? {
            Committed::Applied(payment) => {
                tracing::info!(
                    request_id = %payment.request_id,
                    generation = payment.generation,
                    "Payment resubmitted"
                );
                if was_waiting {
                    self.ctx
                        .publisher
                        .clear_pending_confirmation(&payment.request_id)
                        .await;
                }
                Ok(payment)
            }
            Committed::Discarded(payment) => Err(PaymentError::StateError(format!(
                "Cannot reprocess a {} payment",
                payment.status
            ))),
        }
    }
}
