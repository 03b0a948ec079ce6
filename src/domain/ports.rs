use super::account::{Account, AccountId, Transfer};
use super::events::PendingConfirmation;
use super::payment::Payment;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of a conditional payment write.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WriteOutcome {
    Applied,
    /// The stored record moved on (newer version or terminal status); the
    /// write was discarded.
    Conflict,
}

/// Result of the atomic settlement commit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SettlementOutcome {
    Settled,
    /// The payer could not cover the amount at commit time; nothing changed.
    InsufficientFunds,
    Conflict,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the first generation of a saga and assigns its `internal_id`.
    ///
    /// Fails with `ConcurrencyConflict` when the request id already exists.
    async fn insert(&self, payment: Payment) -> Result<Payment>;

    /// Writes `payment` only if the stored record still has
    /// `expected_version` and is not terminal. `payment.version` must already
    /// carry the new version.
    async fn update(&self, payment: &Payment, expected_version: u64) -> Result<WriteOutcome>;

    async fn get(&self, request_id: &str) -> Result<Option<Payment>>;

    /// Open payments whose `created_at + ttl_secs` is before `now`.
    async fn find_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> Result<Vec<Payment>>;

    async fn all_payments(&self) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn store_account(&self, account: Account) -> Result<()>;
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;
}

/// Payments and balances living in one consistency domain.
#[async_trait]
pub trait SettlementStore: PaymentStore + AccountLedger {
    /// Moves `transfer` between the two balances and writes `payment` as one
    /// atomic unit, under the same version/terminal condition as
    /// [`PaymentStore::update`].
    async fn commit_transfer(
        &self,
        payment: &Payment,
        expected_version: u64,
        transfer: &Transfer,
    ) -> Result<SettlementOutcome>;
}

pub type SagaStoreRef = Arc<dyn SettlementStore>;

/// Fan-out of saga outcomes to external subscribers.
#[async_trait]
pub trait OutcomePublisher: Send + Sync {
    /// Called after every committed state change.
    async fn publish_saga_outcome(&self, payment: &Payment);
    /// Called when a saga starts waiting for the user's confirmation.
    async fn publish_pending_confirmation(&self, pending: PendingConfirmation);
    /// Withdraws a pending-confirmation notification.
    async fn clear_pending_confirmation(&self, request_id: &str);
}

pub type PublisherRef = Arc<dyn OutcomePublisher>;
