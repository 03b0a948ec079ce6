use super::aggregator::CheckAggregator;
use super::context::SagaContext;
use super::settlement::{SettlementExecutor, SettlementQueue};
use super::submission::SubmissionService;
use super::sweeper::ExpirySweeper;
use crate::config::SagaConfig;
use crate::domain::account::{Account, AccountId};
use crate::domain::events::{CheckEvent, ConfirmationDecision, InboxMessage, SubmitPayment};
use crate::domain::payment::Payment;
use crate::domain::ports::{PublisherRef, SagaStoreRef};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The main entry point of the payment saga engine.
///
/// `SagaEngine` wires the submission service, check aggregator, settlement
/// queue and expiry sweeper around one store and one publisher. It must be
/// created inside a Tokio runtime because it spawns the settlement worker.
pub struct SagaEngine {
    ctx: SagaContext,
    submissions: SubmissionService,
    aggregator: CheckAggregator,
    settlements: SettlementQueue,
    sweeper: ExpirySweeper,
    config: SagaConfig,
    shutdown: CancellationToken,
}

impl SagaEngine {
    /// Creates a new `SagaEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Payments and account balances, one consistency domain.
    /// * `publisher` - Receives every committed outcome.
    /// * `config` - Time limit, queue bounds and sweep interval.
    pub fn new(store: SagaStoreRef, publisher: PublisherRef, config: SagaConfig) -> Self {
        let ctx = SagaContext::new(store, publisher, config.expire_payment_ttl_secs);
        let shutdown = CancellationToken::new();
        let settlements = SettlementQueue::spawn(
            SettlementExecutor::new(ctx.clone()),
            config.settlement_queue_capacity,
            shutdown.child_token(),
        );
        Self {
            submissions: SubmissionService::new(ctx.clone()),
            aggregator: CheckAggregator::new(ctx.clone()),
            sweeper: ExpirySweeper::new(ctx.clone()),
            settlements,
            ctx,
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub async fn open_account(&self, id: impl Into<AccountId>, balance: Decimal) -> Result<Account> {
        let account = Account::open(id, balance)?;
        self.ctx.store.store_account(account.clone()).await?;
        Ok(account)
    }

    pub async fn submit(&self, request: SubmitPayment) -> Result<Payment> {
        self.submit_at(request, Utc::now()).await
    }

    pub async fn submit_at(&self, request: SubmitPayment, now: DateTime<Utc>) -> Result<Payment> {
        self.submissions.submit(request, now).await
    }

    pub async fn apply_check(&self, event: CheckEvent) -> Result<Payment> {
        self.aggregator.apply(event).await
    }

    pub async fn confirm(&self, decision: ConfirmationDecision) -> Result<Payment> {
        self.confirm_at(decision, Utc::now()).await
    }

    /// Queues the decision for the settlement worker and waits for the result.
    pub async fn confirm_at(
        &self,
        decision: ConfirmationDecision,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        self.settlements.submit(decision, now).await
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        self.sweeper.sweep(now).await
    }

    /// Starts the periodic expiry sweeper. It stops on [`SagaEngine::shutdown`].
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let sweeper = ExpirySweeper::new(self.ctx.clone());
        tokio::spawn(sweeper.run(self.config.sweep_interval, self.shutdown.child_token()))
    }

    /// Dispatches one inbox message. Returns the payments it changed or read.
    pub async fn handle(&self, message: InboxMessage) -> Result<Vec<Payment>> {
        match message {
            InboxMessage::Submit(request) => Ok(vec![self.submit(request).await?]),
            InboxMessage::Check(event) => Ok(vec![self.apply_check(event).await?]),
            InboxMessage::Confirm { decision, at } => Ok(vec![
                self.confirm_at(decision, at.unwrap_or_else(Utc::now)).await?,
            ]),
            InboxMessage::Sweep { at } => self.sweep_expired(at).await,
        }
    }

    pub async fn payment(&self, request_id: &str) -> Result<Option<Payment>> {
        self.ctx.store.get(request_id).await
    }

    pub async fn payments(&self) -> Result<Vec<Payment>> {
        self.ctx.store.all_payments().await
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.ctx.store.all_accounts().await
    }

    /// Stops the settlement worker and any sweeper started by this engine.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SagaEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
