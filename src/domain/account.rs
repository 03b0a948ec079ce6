use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A monetary value held by an account.
///
/// Wraps `rust_decimal::Decimal` so that ledger arithmetic never goes through
/// floating point.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive amount moved by a payment.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whether this balance can pay `amount` without going negative.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Identifier of a ledger account (the payer or payee of a payment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A ledger account. Only the settlement commit changes `balance`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    #[serde(rename = "account")]
    pub id: AccountId,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, balance: Balance) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    /// Opens an account, refusing negative opening balances.
    pub fn open(id: impl Into<AccountId>, balance: Decimal) -> Result<Self, PaymentError> {
        if balance < Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Opening balance cannot be negative".to_string(),
            ));
        }
        Ok(Self::new(id, Balance::new(balance)))
    }
}

/// The dual-account adjustment performed by a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub payer: AccountId,
    pub payee: AccountId,
    pub amount: Amount,
}

impl Transfer {
    /// Applies the transfer to both accounts, or to neither when the payer
    /// cannot cover the amount.
    pub fn apply(&self, payer: &mut Account, payee: &mut Account) -> Result<(), PaymentError> {
        if payer.id != self.payer || payee.id != self.payee {
            return Err(PaymentError::StateError(
                "Transfer applied to the wrong accounts".to_string(),
            ));
        }
        if !payer.balance.covers(self.amount) {
            return Err(PaymentError::ValidationError(
                "Insufficient funds".to_string(),
            ));
        }
        payer.balance -= self.amount.into();
        payee.balance += self.amount.into();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_covers_exact_amount() {
        let balance = Balance::new(dec!(100.05));
        assert!(balance.covers(Amount::new(dec!(100.05)).unwrap()));
        assert!(!balance.covers(Amount::new(dec!(100.06)).unwrap()));
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        for value in [dec!(0), dec!(-5)] {
            assert!(matches!(
                Amount::new(value),
                Err(PaymentError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        let ok: Amount = serde_json::from_str("\"100.05\"").unwrap();
        assert_eq!(ok.value(), dec!(100.05));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn test_account_id_from_owned_string() {
        let account = Account::open(String::from("alice"), dec!(1)).unwrap();
        assert_eq!(account.id, AccountId::from("alice"));
    }

    #[test]
    fn test_open_rejects_negative_balance() {
        assert!(Account::open("alice", dec!(0)).is_ok());
        assert!(matches!(
            Account::open("alice", dec!(-0.01)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_transfer_conserves_total() {
        let mut payer = Account::new("alice", Balance::new(dec!(100.10)));
        let mut payee = Account::new("bob", Balance::new(dec!(1000.10)));
        let transfer = Transfer {
            payer: payer.id.clone(),
            payee: payee.id.clone(),
            amount: Amount::new(dec!(100.05)).unwrap(),
        };

        transfer.apply(&mut payer, &mut payee).unwrap();

        assert_eq!(payer.balance, Balance::new(dec!(0.05)));
        assert_eq!(payee.balance, Balance::new(dec!(1100.15)));
    }

    #[test]
    fn test_transfer_insufficient_leaves_both_untouched() {
        let mut payer = Account::new("alice", Balance::new(dec!(50.00)));
        let mut payee = Account::new("bob", Balance::new(dec!(1000.10)));
        let transfer = Transfer {
            payer: payer.id.clone(),
            payee: payee.id.clone(),
            amount: Amount::new(dec!(100.05)).unwrap(),
        };

        assert!(transfer.apply(&mut payer, &mut payee).is_err());
        assert_eq!(payer.balance, Balance::new(dec!(50.00)));
        assert_eq!(payee.balance, Balance::new(dec!(1000.10)));
    }
}
