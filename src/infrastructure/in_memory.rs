use crate::domain::account::{Account, AccountId, Transfer};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AccountLedger, PaymentStore, SettlementOutcome, SettlementStore, WriteOutcome,
};
use crate::domain::state::PaymentStatus;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    payments: HashMap<String, Payment>,
    accounts: HashMap<AccountId, Account>,
    next_id: u64,
}

impl State {
    /// Checks the optimistic-concurrency condition for a payment write.
    fn accepts(&self, payment: &Payment, expected_version: u64) -> bool {
        match self.payments.get(&payment.request_id) {
            Some(stored) => stored.version == expected_version && !stored.status.is_terminal(),
            None => false,
        }
    }
}

/// A thread-safe in-memory store for payments and account balances.
///
/// Both live behind one `RwLock`, so a settlement commit that touches the
/// payment and two balances is atomic with respect to every other reader and
/// writer. `Clone` shares the underlying state.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert(&self, mut payment: Payment) -> Result<Payment> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.request_id) {
            return Err(PaymentError::ConcurrencyConflict(payment.request_id));
        }
        state.next_id += 1;
        payment.internal_id = Some(state.next_id);
        state
            .payments
            .insert(payment.request_id.clone(), payment.clone());
        Ok(payment)
    }

    async fn update(&self, payment: &Payment, expected_version: u64) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        if !state.accepts(payment, expected_version) {
            return Ok(WriteOutcome::Conflict);
        }
        state
            .payments
            .insert(payment.request_id.clone(), payment.clone());
        Ok(WriteOutcome::Applied)
    }

    async fn get(&self, request_id: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(request_id).cloned())
    }

    async fn find_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut expired: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| {
                PaymentStatus::OPEN.contains(&p.status)
                    && p.expires_at(ttl_secs).is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|p| p.created_at);
        Ok(expired)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.internal_id);
        Ok(payments)
    }
}

#[async_trait]
impl AccountLedger for InMemoryStore {
    async fn store_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(id).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn commit_transfer(
        &self,
        payment: &Payment,
        expected_version: u64,
        transfer: &Transfer,
    ) -> Result<SettlementOutcome> {
        let mut state = self.state.write().await;
        if !state.accepts(payment, expected_version) {
            return Ok(SettlementOutcome::Conflict);
        }

        let mut payer = state
            .accounts
            .get(&transfer.payer)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("account {}", transfer.payer)))?;
        let mut payee = state
            .accounts
            .get(&transfer.payee)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("account {}", transfer.payee)))?;

        if !payer.balance.covers(transfer.amount) {
            return Ok(SettlementOutcome::InsufficientFunds);
        }
        transfer.apply(&mut payer, &mut payee)?;

        // Nothing below can fail, so all three writes land together.
        state.accounts.insert(payer.id.clone(), payer);
        state.accounts.insert(payee.id.clone(), payee);
        state
            .payments
            .insert(payment.request_id.clone(), payment.clone());
        Ok(SettlementOutcome::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Amount, Balance};
    use crate::domain::events::SubmitPayment;
    use crate::domain::state::SagaEvent;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn payment(id: &str, created_at: DateTime<Utc>) -> Payment {
        let request = SubmitPayment {
            request_id: id.to_string(),
            amount: Amount::new(dec!(10)).unwrap(),
            payer: "alice".into(),
            payee: "bob".into(),
            created_at: None,
        };
        Payment::new(&request, created_at).unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .store_account(Account::new("alice", Balance::new(dec!(25))))
            .await
            .unwrap();
        store
            .store_account(Account::new("bob", Balance::new(dec!(5))))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_internal_id_once() {
        let store = InMemoryStore::new();
        let first = store.insert(payment("r1", Utc::now())).await.unwrap();
        let second = store.insert(payment("r2", Utc::now())).await.unwrap();
        assert_eq!(first.internal_id, Some(1));
        assert_eq!(second.internal_id, Some(2));

        assert!(matches!(
            store.insert(payment("r1", Utc::now())).await,
            Err(PaymentError::ConcurrencyConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_expected_version() {
        let store = InMemoryStore::new();
        let mut stored = store.insert(payment("r1", Utc::now())).await.unwrap();

        stored.version = 1;
        assert_eq!(store.update(&stored, 0).await.unwrap(), WriteOutcome::Applied);
        // Stale writer still believes the version is 0.
        assert_eq!(store.update(&stored, 0).await.unwrap(), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_update_never_touches_terminal_records() {
        let store = InMemoryStore::new();
        let mut stored = store.insert(payment("r1", Utc::now())).await.unwrap();
        stored.advance(SagaEvent::Expired, Utc::now(), Some("Payment expired"));
        stored.version = 1;
        store.update(&stored, 0).await.unwrap();

        let mut late = stored.clone();
        late.version = 2;
        assert_eq!(store.update(&late, 1).await.unwrap(), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_find_expired_filters_by_status_and_age() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert(payment("old", now - Duration::seconds(120)))
            .await
            .unwrap();
        store
            .insert(payment("fresh", now - Duration::seconds(10)))
            .await
            .unwrap();
        let mut done = store
            .insert(payment("done", now - Duration::seconds(500)))
            .await
            .unwrap();
        done.advance(SagaEvent::CheckFailed, now, Some("failed"));
        done.version = 1;
        store.update(&done, 0).await.unwrap();

        let expired = store.find_expired(60, now).await.unwrap();
        let ids: Vec<&str> = expired.iter().map(|p| p.request_id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[tokio::test]
    async fn test_find_expired_with_out_of_range_ttl() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert(payment("old", now - Duration::seconds(500)))
            .await
            .unwrap();

        for ttl in [100_000_000_000_000, i64::MAX as u64, u64::MAX] {
            assert!(store.find_expired(ttl, now).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_commit_transfer_moves_both_balances() {
        let store = seeded().await;
        let mut stored = store.insert(payment("r1", Utc::now())).await.unwrap();
        stored.version = 1;

        let outcome = store
            .commit_transfer(&stored, 0, &stored.transfer())
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Settled);

        let alice = store.get_account(&"alice".into()).await.unwrap().unwrap();
        let bob = store.get_account(&"bob".into()).await.unwrap().unwrap();
        assert_eq!(alice.balance, Balance::new(dec!(15)));
        assert_eq!(bob.balance, Balance::new(dec!(15)));
        assert_eq!(store.get("r1").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_commit_transfer_conflict_changes_nothing() {
        let store = seeded().await;
        let mut stored = store.insert(payment("r1", Utc::now())).await.unwrap();
        stored.version = 1;

        let outcome = store
            .commit_transfer(&stored, 9, &stored.transfer())
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Conflict);

        let alice = store.get_account(&"alice".into()).await.unwrap().unwrap();
        assert_eq!(alice.balance, Balance::new(dec!(25)));
    }

    #[tokio::test]
    async fn test_commit_transfer_insufficient_funds() {
        let store = seeded().await;
        let mut big = payment("r1", Utc::now());
        big.amount = Amount::new(dec!(30)).unwrap();
        let mut stored = store.insert(big).await.unwrap();
        stored.version = 1;

        let outcome = store
            .commit_transfer(&stored, 0, &stored.transfer())
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::InsufficientFunds);
        assert_eq!(store.get("r1").await.unwrap().unwrap().version, 0);
    }
}
