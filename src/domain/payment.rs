use super::account::{AccountId, Amount, Transfer};
use super::events::{CheckType, SubmitPayment};
use super::state::{PaymentStatus, SagaEvent};
use crate::error::PaymentError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MSG_EXPIRED: &str = "Payment expired";
pub const MSG_USER_DECLINED: &str = "User has declined payment";
pub const MSG_INSUFFICIENT_FUNDS: &str = "User has not sufficient resources";
pub const MSG_COMPLETED: &str = "Payment successful";

/// Which verification checks have passed for the current generation.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct CheckFlags {
    pub sanction_checked: bool,
    pub auth_checked: bool,
    pub user_confirmed: bool,
}

impl CheckFlags {
    /// Marks `check` as passed. Returns `false` when it already was.
    pub fn record(&mut self, check: CheckType) -> bool {
        let flag = match check {
            CheckType::SanctionCheck => &mut self.sanction_checked,
            CheckType::AuthCheck => &mut self.auth_checked,
            CheckType::UserConfirmationCheck => &mut self.user_confirmed,
        };
        !std::mem::replace(flag, true)
    }

    pub fn all_passed(&self) -> bool {
        self.sanction_checked && self.auth_checked && self.user_confirmed
    }
}

/// One payment saga: the request plus everything learned about it so far.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub request_id: String,
    /// Storage key, assigned on first insert and kept across generations.
    pub internal_id: Option<u64>,
    pub amount: Amount,
    pub payer: AccountId,
    pub payee: AccountId,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub checks: CheckFlags,
    pub failure_message: Option<String>,
    pub generation: u32,
    /// Bumped on every committed write; stores compare it before writing.
    pub version: u64,
}

impl Payment {
    /// Builds the first generation of a saga from a validated submission.
    pub fn new(request: &SubmitPayment, now: DateTime<Utc>) -> Result<Self, PaymentError> {
        request.validate()?;
        Ok(Self {
            request_id: request.request_id.clone(),
            internal_id: None,
            amount: request.amount,
            payer: request.payer.clone(),
            payee: request.payee.clone(),
            status: PaymentStatus::Processing,
            created_at: request.created_at.unwrap_or(now),
            processed_at: None,
            checks: CheckFlags::default(),
            failure_message: None,
            generation: 0,
            version: 0,
        })
    }

    /// Starts a new generation from a resubmission of an unfinished saga.
    ///
    /// Check flags and outcome fields reset; `internal_id` and `created_at`
    /// are kept so expiry is still measured from the first submission.
    pub fn regenerate(&mut self, request: &SubmitPayment) -> Result<(), PaymentError> {
        request.validate()?;
        let next = self.status.next(SagaEvent::Resubmitted).ok_or_else(|| {
            PaymentError::StateError(format!(
                "Cannot reprocess a {} payment",
                self.status
            ))
        })?;
        self.amount = request.amount;
        self.payer = request.payer.clone();
        self.payee = request.payee.clone();
        self.status = next;
        self.checks = CheckFlags::default();
        self.processed_at = None;
        self.failure_message = None;
        self.generation += 1;
        Ok(())
    }

    /// Applies `event` to the status. Returns whether the status changed.
    ///
    /// Terminal and confirmation-pending statuses stamp `processed_at`;
    /// `message`, when given, is appended to the failure message.
    pub fn advance(
        &mut self,
        event: SagaEvent,
        at: DateTime<Utc>,
        message: Option<&str>,
    ) -> bool {
        let Some(next) = self.status.next(event) else {
            return false;
        };
        self.status = next;
        if next.is_terminal() || next == PaymentStatus::WaitingForUserConfirmation {
            self.processed_at = Some(at);
        }
        if let Some(message) = message {
            self.append_message(message);
        }
        true
    }

    pub fn append_message(&mut self, message: &str) {
        self.failure_message = Some(match self.failure_message.take() {
            Some(previous) if !previous.is_empty() => format!("{previous}; {message}"),
            _ => message.to_string(),
        });
    }

    /// Whole seconds elapsed since creation, as of `at`.
    pub fn elapsed_secs(&self, at: DateTime<Utc>) -> i64 {
        (at - self.created_at).num_seconds()
    }

    pub fn is_expired(&self, at: DateTime<Utc>, ttl_secs: u64) -> bool {
        u64::try_from(self.elapsed_secs(at)).is_ok_and(|elapsed| elapsed > ttl_secs)
    }

    pub fn remaining_secs(&self, at: DateTime<Utc>, ttl_secs: u64) -> i64 {
        i64::try_from(ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_sub(self.elapsed_secs(at))
    }

    /// End of the time limit, or `None` when it lies beyond the range of a
    /// timestamp.
    pub fn expires_at(&self, ttl_secs: u64) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(ttl_secs).ok().and_then(Duration::try_seconds)?;
        self.created_at.checked_add_signed(ttl)
    }

    pub fn transfer(&self) -> Transfer {
        Transfer {
            payer: self.payer.clone(),
            payee: self.payee.clone(),
            amount: self.amount,
        }
    }
}
