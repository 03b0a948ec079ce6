use super::context::{Committed, SagaContext};
use crate::domain::payment::{MSG_EXPIRED, Payment};
use crate::domain::state::SagaEvent;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Declines open payments that outlived the time limit.
pub struct ExpirySweeper {
    ctx: SagaContext,
}

impl ExpirySweeper {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    /// Runs one sweep as of `now` and returns the payments it declined.
    ///
    /// Each candidate is re-read under its lock; a payment that finished in
    /// the meantime is skipped, and a write that loses a race is dropped. A
    /// candidate that fails is logged and left for the next sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let candidates = self.ctx.store.find_expired(self.ctx.ttl_secs, now).await?;
        let mut declined = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self.expire(&candidate.request_id, now).await {
                Ok(Some(payment)) => declined.push(payment),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    request_id = %candidate.request_id,
                    error = %e,
                    "Failed to expire payment"
                ),
            }
        }

        Ok(declined)
    }

    async fn expire(&self, request_id: &str, now: DateTime<Utc>) -> Result<Option<Payment>> {
        let _guard = self.ctx.locks.lock(request_id).await;
        let mut payment = self.ctx.load(request_id).await?;
        if !payment.is_expired(now, self.ctx.ttl_secs)
            || !payment.advance(SagaEvent::Expired, now, Some(MSG_EXPIRED))
        {
            return Ok(None);
        }

        let Committed::Applied(payment) = self.ctx.commit(payment).await? else {
            return Ok(None);
        };
        tracing::info!(request_id = %payment.request_id, "Declined expired payment");
        self.ctx.publisher.publish_saga_outcome(&payment).await;
        self.ctx
            .publisher
            .clear_pending_confirmation(&payment.request_id)
            .await;
        Ok(Some(payment))
    }

    /// Sweeps every `interval` until `shutdown` is cancelled.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(declined) if !declined.is_empty() => {
                            tracing::debug!(count = declined.len(), "Sweep declined payments");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
