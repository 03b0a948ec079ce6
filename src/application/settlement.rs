use super::context::{Committed, SagaContext};
use crate::domain::events::ConfirmationDecision;
use crate::domain::payment::{
    MSG_COMPLETED, MSG_EXPIRED, MSG_INSUFFICIENT_FUNDS, MSG_USER_DECLINED, Payment,
};
use crate::domain::ports::SettlementOutcome;
use crate::domain::state::{PaymentStatus, SagaEvent};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Turns the user's confirmation into a terminal outcome, moving money at
/// most once.
pub struct SettlementExecutor {
    ctx: SagaContext,
}

impl SettlementExecutor {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    /// Settles, declines or marks insufficient funds for a payment awaiting
    /// confirmation, as of `now`.
    ///
    /// Fails with `StateError` unless the saga is waiting for confirmation
    /// with every check passed; the stored record is then left untouched.
    pub async fn confirm(
        &self,
        decision: ConfirmationDecision,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        let _guard = self.ctx.locks.lock(&decision.request_id).await;
        let mut payment = self.ctx.load(&decision.request_id).await?;

        if payment.status != PaymentStatus::WaitingForUserConfirmation
            || !payment.checks.all_passed()
        {
            return Err(PaymentError::StateError(format!(
                "Payment {} is {} and cannot be confirmed",
                payment.request_id, payment.status
            )));
        }

        let committed = if payment.is_expired(now, self.ctx.ttl_secs) {
            payment.advance(SagaEvent::Expired, now, Some(MSG_EXPIRED));
            self.ctx.commit(payment).await?
        } else if !decision.confirmed {
            payment.advance(SagaEvent::Rejected, now, Some(MSG_USER_DECLINED));
            self.ctx.commit(payment).await?
        } else {
            self.settle(payment, now).await?
        };

        let settled = match committed {
            Committed::Applied(settled) => settled,
            // The winning writer already published its outcome.
            Committed::Discarded(current) => return Ok(current),
        };
        tracing::info!(
            request_id = %settled.request_id,
            confirmed = decision.confirmed,
            status = %settled.status,
            "Processed confirmation"
        );
        self.ctx.publisher.publish_saga_outcome(&settled).await;
        self.ctx
            .publisher
            .clear_pending_confirmation(&settled.request_id)
            .await;
        Ok(settled)
    }

    async fn settle(&self, payment: Payment, now: DateTime<Utc>) -> Result<Committed> {
        let payer = self
            .ctx
            .store
            .get_account(&payment.payer)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("account {}", payment.payer)))?;

        if payer.balance.covers(payment.amount) {
            let expected = payment.version;
            let mut completed = payment.clone();
            completed.advance(SagaEvent::Confirmed { funded: true }, now, Some(MSG_COMPLETED));
            completed.version += 1;

            match self
                .ctx
                .store
                .commit_transfer(&completed, expected, &completed.transfer())
                .await?
            {
                SettlementOutcome::Settled => return Ok(Committed::Applied(completed)),
                SettlementOutcome::Conflict => {
                    tracing::debug!(request_id = %payment.request_id, "Settlement lost a concurrent write");
                    let current = self.ctx.load(&payment.request_id).await?;
                    return Ok(Committed::Discarded(current));
                }
                // Another settlement drained the payer between our read
                // and the commit.
                SettlementOutcome::InsufficientFunds => {}
            }
        }

        let mut unfunded = payment;
        unfunded.advance(
            SagaEvent::Confirmed { funded: false },
            now,
            Some(MSG_INSUFFICIENT_FUNDS),
        );
        self.ctx.commit(unfunded).await
    }
}

struct SettlementJob {
    decision: ConfirmationDecision,
    at: DateTime<Utc>,
    reply: oneshot::Sender<Result<Payment>>,
}

/// Bounded work queue in front of the [`SettlementExecutor`].
///
/// Confirmations are settled one at a time by a single worker task, which
/// keeps balance mutation off the event-handling path. When the queue is
/// full, callers wait for room instead of piling up.
#[derive(Clone)]
pub struct SettlementQueue {
    tx: mpsc::Sender<SettlementJob>,
}

impl SettlementQueue {
    /// Spawns the worker and returns the handle used to enqueue work.
    pub fn spawn(
        executor: SettlementExecutor,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<SettlementJob>(capacity.max(1));
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                let result = executor.confirm(job.decision, job.at).await;
                // The caller may have given up waiting.
                let _ = job.reply.send(result);
            }
            tracing::debug!("Settlement worker stopped");
        });
        Self { tx }
    }

    pub async fn submit(
        &self,
        decision: ConfirmationDecision,
        at: DateTime<Utc>,
    ) -> Result<Payment> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SettlementJob {
                decision,
                at,
                reply,
            })
            .await
            .map_err(|_| PaymentError::internal("settlement worker is not running"))?;
        response
            .await
            .map_err(|_| PaymentError::internal("settlement worker dropped the job"))?
    }
}
