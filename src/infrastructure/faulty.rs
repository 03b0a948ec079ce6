//! Store wrapper that injects failures and lost races into an
//! [`InMemoryStore`].

use super::in_memory::InMemoryStore;
use crate::domain::account::{Account, AccountId, Transfer};
use crate::domain::payment::{MSG_EXPIRED, Payment};
use crate::domain::ports::{
    AccountLedger, PaymentStore, SettlementOutcome, SettlementStore, WriteOutcome,
};
use crate::domain::state::SagaEvent;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub(crate) struct FaultyStore {
    pub inner: InMemoryStore,
    unreadable: Mutex<HashSet<String>>,
    expire_before_settling: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Makes every read of `request_id` fail.
    pub fn break_reads(&self, request_id: &str) {
        self.unreadable
            .lock()
            .unwrap()
            .insert(request_id.to_string());
    }

    /// Lets a competing expiry commit right before the next settlement.
    pub fn expire_before_settling(&self) {
        self.expire_before_settling.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentStore for FaultyStore {
    async fn insert(&self, payment: Payment) -> Result<Payment> {
        self.inner.insert(payment).await
    }

    async fn update(&self, payment: &Payment, expected_version: u64) -> Result<WriteOutcome> {
        self.inner.update(payment, expected_version).await
    }

    async fn get(&self, request_id: &str) -> Result<Option<Payment>> {
        if self.unreadable.lock().unwrap().contains(request_id) {
            return Err(PaymentError::internal(format!("cannot read {request_id}")));
        }
        self.inner.get(request_id).await
    }

    async fn find_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        self.inner.find_expired(ttl_secs, now).await
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        self.inner.all_payments().await
    }
}

#[async_trait]
impl AccountLedger for FaultyStore {
    async fn store_account(&self, account: Account) -> Result<()> {
        self.inner.store_account(account).await
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.inner.all_accounts().await
    }
}

#[async_trait]
impl SettlementStore for FaultyStore {
    async fn commit_transfer(
        &self,
        payment: &Payment,
        expected_version: u64,
        transfer: &Transfer,
    ) -> Result<SettlementOutcome> {
        if self.expire_before_settling.swap(false, Ordering::SeqCst) {
            if let Some(mut stored) = self.inner.get(&payment.request_id).await? {
                let version = stored.version;
                stored.advance(SagaEvent::Expired, Utc::now(), Some(MSG_EXPIRED));
                stored.version += 1;
                self.inner.update(&stored, version).await?;
            }
        }
        self.inner
            .commit_transfer(payment, expected_version, transfer)
            .await
    }
}
