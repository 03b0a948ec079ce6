use crate::domain::account::Account;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

// `balance` stays textual: letting csv infer a number would go through f64.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    account: String,
    balance: String,
}

/// Reads opening balances from a CSV source with an `account,balance` header.
///
/// Whitespace around fields is trimmed. Negative balances surface as
/// validation errors for the offending row only.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one account per row.
    pub fn accounts(self) -> impl Iterator<Item = Result<Account>> {
        self.reader
            .into_deserialize::<AccountRecord>()
            .map(|record| {
                let record = record.map_err(PaymentError::from)?;
                let balance = Decimal::from_str(&record.balance).map_err(|e| {
                    PaymentError::ValidationError(format!(
                        "Invalid balance {:?} for account {}: {e}",
                        record.balance, record.account
                    ))
                })?;
                Account::open(record.account, balance)
            })
    }
}
