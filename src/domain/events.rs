//! Messages crossing the saga engine boundary.

use super::account::{AccountId, Amount};
use super::payment::Payment;
use super::state::PaymentStatus;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckType {
    SanctionCheck,
    AuthCheck,
    UserConfirmationCheck,
}

impl CheckType {
    pub const ALL: [CheckType; 3] = [
        CheckType::SanctionCheck,
        CheckType::AuthCheck,
        CheckType::UserConfirmationCheck,
    ];
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckType::SanctionCheck => "SANCTION_CHECK",
            CheckType::AuthCheck => "AUTH_CHECK",
            CheckType::UserConfirmationCheck => "USER_CONFIRMATION_CHECK",
        })
    }
}

/// A verification result delivered by the inbox.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CheckEvent {
    pub request_id: String,
    pub occurred_at: DateTime<Utc>,
    pub check_type: CheckType,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CheckEvent {
    pub fn passed(request_id: impl Into<String>, check_type: CheckType, at: DateTime<Utc>) -> Self {
        Self {
            request_id: request_id.into(),
            occurred_at: at,
            check_type,
            failed: false,
            reason: None,
        }
    }

    pub fn failed(
        request_id: impl Into<String>,
        check_type: CheckType,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            occurred_at: at,
            check_type,
            failed: true,
            reason: Some(reason.into()),
        }
    }
}

/// A client's request to move `amount` from `payer` to `payee`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SubmitPayment {
    pub request_id: String,
    pub amount: Amount,
    pub payer: AccountId,
    pub payee: AccountId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SubmitPayment {
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.request_id.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Request id is required".to_string(),
            ));
        }
        if self.payer.as_str().trim().is_empty() || self.payee.as_str().trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Payer and payee are required".to_string(),
            ));
        }
        if self.payer == self.payee {
            return Err(PaymentError::ValidationError(
                "Cannot make a payment for yourself".to_string(),
            ));
        }
        Ok(())
    }
}

/// The user's answer to an awaiting-confirmation payment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ConfirmationDecision {
    pub request_id: String,
    pub confirmed: bool,
}

/// Envelope for everything the inbox can deliver.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxMessage {
    Submit(SubmitPayment),
    Check(CheckEvent),
    Confirm {
        #[serde(flatten)]
        decision: ConfirmationDecision,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Runs one expiry sweep as of `at`; used when replaying recorded traffic.
    Sweep { at: DateTime<Utc> },
}

impl InboxMessage {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            InboxMessage::Submit(request) => Some(&request.request_id),
            InboxMessage::Check(event) => Some(&event.request_id),
            InboxMessage::Confirm { decision, .. } => Some(&decision.request_id),
            InboxMessage::Sweep { .. } => None,
        }
    }
}

/// Outbound notification payload for a committed state change.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentView {
    pub request_id: String,
    pub amount: Amount,
    pub payer: AccountId,
    pub payee: AccountId,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            request_id: payment.request_id.clone(),
            amount: payment.amount,
            payer: payment.payer.clone(),
            payee: payment.payee.clone(),
            status: payment.status,
            created_at: payment.created_at,
            processed_at: payment.processed_at,
            message: payment.failure_message.clone(),
        }
    }
}

/// Notification shown to the payee while a payment awaits confirmation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub request_id: String,
    pub payer: AccountId,
    pub payee: AccountId,
    pub amount: Amount,
    pub remaining_time_in_seconds: i64,
}

impl PendingConfirmation {
    pub fn new(payment: &Payment, remaining_time_in_seconds: i64) -> Self {
        Self {
            request_id: payment.request_id.clone(),
            payer: payment.payer.clone(),
            payee: payment.payee.clone(),
            amount: payment.amount,
            remaining_time_in_seconds,
        }
    }
}
