//! The payment saga state machine.
//!
//! Every status change goes through [`PaymentStatus::next`]. Call sites never
//! inspect check flags to decide a status; they translate what happened into
//! a [`SagaEvent`] and let the transition table answer.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processing,
    Reprocessing,
    WaitingForUserConfirmation,
    Completed,
    InsufficientResources,
    Declined,
}

/// Something that happened to a saga, as far as its status is concerned.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SagaEvent {
    /// The same request id was submitted again before finishing.
    Resubmitted,
    /// A verification check reported failure.
    CheckFailed,
    /// The last missing check flag was set.
    ChecksCompleted,
    /// The time limit elapsed.
    Expired,
    /// The user confirmed; `funded` tells whether the payer could pay.
    Confirmed { funded: bool },
    /// The user declined the payment.
    Rejected,
}

impl PaymentStatus {
    /// Statuses the expiry sweeper scans.
    pub const OPEN: [PaymentStatus; 3] = [
        PaymentStatus::Processing,
        PaymentStatus::Reprocessing,
        PaymentStatus::WaitingForUserConfirmation,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::InsufficientResources
                | PaymentStatus::Declined
        )
    }

    /// Returns the status reached by applying `event`, or `None` when the
    /// event does not move this saga (including every event on a terminal
    /// status).
    pub fn next(self, event: SagaEvent) -> Option<PaymentStatus> {
        use PaymentStatus::*;
        match (self, event) {
            (Completed | InsufficientResources | Declined, _) => None,
            (_, SagaEvent::Resubmitted) => Some(Reprocessing),
            (_, SagaEvent::CheckFailed | SagaEvent::Expired) => Some(Declined),
            (Processing | Reprocessing, SagaEvent::ChecksCompleted) => {
                Some(WaitingForUserConfirmation)
            }
            (WaitingForUserConfirmation, SagaEvent::ChecksCompleted) => None,
            (WaitingForUserConfirmation, SagaEvent::Confirmed { funded: true }) => Some(Completed),
            (WaitingForUserConfirmation, SagaEvent::Confirmed { funded: false }) => {
                Some(InsufficientResources)
            }
            (WaitingForUserConfirmation, SagaEvent::Rejected) => Some(Declined),
            (Processing | Reprocessing, SagaEvent::Confirmed { .. } | SagaEvent::Rejected) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Reprocessing => "REPROCESSING",
            PaymentStatus::WaitingForUserConfirmation => "WAITING_FOR_USER_CONFIRMATION",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::InsufficientResources => "INSUFFICIENT_RESOURCES",
            PaymentStatus::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
