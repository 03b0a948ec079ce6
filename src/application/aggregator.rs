use super::context::{Committed, SagaContext};
use crate::domain::events::{CheckEvent, PendingConfirmation};
use crate::domain::payment::{MSG_EXPIRED, Payment};
use crate::domain::state::{PaymentStatus, SagaEvent};
use crate::error::Result;

/// Folds verification check events into their saga.
///
/// Safe under at-least-once delivery: a flag that is already set stays set,
/// a finished saga ignores everything, and the resulting status depends only
/// on which flags were reached, not on the order they arrived in.
pub struct CheckAggregator {
    ctx: SagaContext,
}

impl CheckAggregator {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    /// Applies `event` and returns the saga as stored afterwards.
    pub async fn apply(&self, event: CheckEvent) -> Result<Payment> {
        let _guard = self.ctx.locks.lock(&event.request_id).await;
        let mut payment = self.ctx.load(&event.request_id).await?;

        if payment.status.is_terminal() {
            tracing::debug!(
                request_id = %payment.request_id,
                status = %payment.status,
                check = %event.check_type,
                "Ignoring check for finished payment"
            );
            return Ok(payment);
        }

        let before = payment.clone();
        let at = event.occurred_at;

        if event.failed {
            let reason = event
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} failed", event.check_type));
            payment.advance(SagaEvent::CheckFailed, at, Some(&reason));
        } else {
            payment.checks.record(event.check_type);
        }

        if payment.is_expired(at, self.ctx.ttl_secs) {
            if !payment.advance(SagaEvent::Expired, at, Some(MSG_EXPIRED)) {
                // Already declined by this very event; expiry still has the
                // last word on the message.
                payment.append_message(MSG_EXPIRED);
            }
        } else if payment.checks.all_passed() {
            payment.advance(SagaEvent::ChecksCompleted, at, None);
        }

        if payment == before {
            tracing::debug!(request_id = %payment.request_id, check = %event.check_type, "Duplicate check, nothing to do");
            return Ok(payment);
        }

        let payment = match self.ctx.commit(payment).await? {
            Committed::Applied(p) => p,
            Committed::Discarded(p) => return Ok(p),
        };
        tracing::info!(
            request_id = %payment.request_id,
            check = %event.check_type,
            failed = event.failed,
            status = %payment.status,
            "Applied check"
        );

        self.ctx.publisher.publish_saga_outcome(&payment).await;
        match (before.status, payment.status) {
            (from, PaymentStatus::WaitingForUserConfirmation)
                if from != PaymentStatus::WaitingForUserConfirmation =>
            {
                let remaining = payment.remaining_secs(at, self.ctx.ttl_secs);
                self.ctx
                    .publisher
                    .publish_pending_confirmation(PendingConfirmation::new(&payment, remaining))
                    .await;
            }
            (PaymentStatus::WaitingForUserConfirmation, to) if to.is_terminal() => {
                self.ctx
                    .publisher
                    .clear_pending_confirmation(&payment.request_id)
                    .await;
            }
            _ => {}
        }

        Ok(payment)
    }
}
