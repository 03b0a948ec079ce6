use crate::domain::account::{Account, AccountId, Transfer};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AccountLedger, PaymentStore, SettlementOutcome, SettlementStore, WriteOutcome,
};
use crate::domain::state::PaymentStatus;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing payment sagas, keyed by request id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for storing account balances, keyed by account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for bookkeeping such as the internal id sequence.
pub const CF_META: &str = "meta";

const NEXT_ID_KEY: &[u8] = b"next_internal_id";

/// A persistent store implementation using RocksDB.
///
/// Payments and accounts live in separate Column Families of the same
/// database. Conditional writes are serialized through `write_lock` and a
/// settlement lands as a single `WriteBatch`, so the payment status and both
/// balances are committed together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_PAYMENTS, CF_ACCOUNTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }

    /// Same condition as the in-memory store: the stored record must still
    /// carry `expected_version` and must not be terminal.
    fn accepts(&self, payment: &Payment, expected_version: u64) -> Result<bool> {
        let stored: Option<Payment> = self.read(CF_PAYMENTS, payment.request_id.as_bytes())?;
        Ok(stored.is_some_and(|s| s.version == expected_version && !s.status.is_terminal()))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert(&self, mut payment: Payment) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;
        let payments = self.cf(CF_PAYMENTS)?;
        let meta = self.cf(CF_META)?;

        let key = payment.request_id.as_bytes();
        if self.db.get_pinned_cf(&payments, key)?.is_some() {
            return Err(PaymentError::ConcurrencyConflict(payment.request_id));
        }

        let next_id = match self.db.get_cf(&meta, NEXT_ID_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| PaymentError::internal("corrupt internal id sequence"))?;
                u64::from_be_bytes(raw) + 1
            }
            None => 1,
        };
        payment.internal_id = Some(next_id);

        let mut batch = WriteBatch::default();
        batch.put_cf(&meta, NEXT_ID_KEY, next_id.to_be_bytes());
        batch.put_cf(&payments, key, encode(&payment)?);
        self.db.write(batch)?;

        Ok(payment)
    }

    async fn update(&self, payment: &Payment, expected_version: u64) -> Result<WriteOutcome> {
        let _guard = self.write_lock.lock().await;
        if !self.accepts(payment, expected_version)? {
            return Ok(WriteOutcome::Conflict);
        }
        let cf = self.cf(CF_PAYMENTS)?;
        self.db
            .put_cf(&cf, payment.request_id.as_bytes(), encode(payment)?)?;
        Ok(WriteOutcome::Applied)
    }

    async fn get(&self, request_id: &str) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, request_id.as_bytes())
    }

    async fn find_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let mut expired: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| {
                PaymentStatus::OPEN.contains(&p.status)
                    && p.expires_at(ttl_secs).is_some_and(|deadline| deadline < now)
            })
            .collect();
        expired.sort_by_key(|p| p.created_at);
        Ok(expired)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        let mut payments = self.scan::<Payment>(CF_PAYMENTS)?;
        payments.sort_by_key(|p| p.internal_id);
        Ok(payments)
    }
}

#[async_trait]
impl AccountLedger for RocksDBStore {
    async fn store_account(&self, account: Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db
            .put_cf(&cf, account.id.as_str().as_bytes(), encode(&account)?)?;
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.read(CF_ACCOUNTS, id.as_str().as_bytes())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        // Keys iterate in byte order, which is account id order.
        self.scan(CF_ACCOUNTS)
    }
}

#[async_trait]
impl SettlementStore for RocksDBStore {
    async fn commit_transfer(
        &self,
        payment: &Payment,
        expected_version: u64,
        transfer: &Transfer,
    ) -> Result<SettlementOutcome> {
        let _guard = self.write_lock.lock().await;
        if !self.accepts(payment, expected_version)? {
            return Ok(SettlementOutcome::Conflict);
        }

        let mut payer: Account = self
            .read(CF_ACCOUNTS, transfer.payer.as_str().as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("account {}", transfer.payer)))?;
        let mut payee: Account = self
            .read(CF_ACCOUNTS, transfer.payee.as_str().as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("account {}", transfer.payee)))?;

        if !payer.balance.covers(transfer.amount) {
            return Ok(SettlementOutcome::InsufficientFunds);
        }
        transfer.apply(&mut payer, &mut payee)?;

        let accounts = self.cf(CF_ACCOUNTS)?;
        let payments = self.cf(CF_PAYMENTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&accounts, payer.id.as_str().as_bytes(), encode(&payer)?);
        batch.put_cf(&accounts, payee.id.as_str().as_bytes(), encode(&payee)?);
        batch.put_cf(&payments, payment.request_id.as_bytes(), encode(payment)?);
        self.db.write(batch)?;

        Ok(SettlementOutcome::Settled)
    }
}
