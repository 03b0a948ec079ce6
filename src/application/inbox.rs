use super::engine::SagaEngine;
use crate::config::SagaConfig;
use crate::domain::events::InboxMessage;
use crate::domain::payment::Payment;
use crate::error::PaymentError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&SagaConfig> for RetryPolicy {
    fn from(config: &SagaConfig) -> Self {
        Self {
            max_attempts: config.inbox_max_attempts.max(1),
            backoff: config.inbox_backoff,
        }
    }
}

/// A message that kept failing after every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message: InboxMessage,
    pub error: String,
    pub attempts: u32,
}

/// What happened to one delivered message.
#[derive(Debug)]
pub enum Delivery {
    Processed(Vec<Payment>),
    /// The engine refused the message; redelivery would not change that.
    Rejected(PaymentError),
    DeadLettered,
}

/// At-least-once front door of the engine.
///
/// Transient failures are retried with a fixed pause, then parked in the
/// dead-letter list. Rejections are returned to the caller right away.
pub struct EventInbox {
    engine: Arc<SagaEngine>,
    policy: RetryPolicy,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl EventInbox {
    pub fn new(engine: Arc<SagaEngine>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            policy,
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SagaEngine> {
        &self.engine
    }

    pub async fn deliver(&self, message: InboxMessage) -> Delivery {
        let mut attempt = 1;
        loop {
            match self.engine.handle(message.clone()).await {
                Ok(payments) => return Delivery::Processed(payments),
                Err(PaymentError::ConcurrencyConflict(id)) => {
                    tracing::debug!(request_id = %id, "Dropping message that lost a concurrent write");
                    return Delivery::Processed(Vec::new());
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        request_id = message.request_id().unwrap_or("-"),
                        attempt,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(
                        request_id = message.request_id().unwrap_or("-"),
                        attempts = attempt,
                        error = %e,
                        "Giving up on message"
                    );
                    self.dead_letters.lock().await.push(DeadLetter {
                        message,
                        error: e.to_string(),
                        attempts: attempt,
                    });
                    return Delivery::DeadLettered;
                }
                Err(e) => return Delivery::Rejected(e),
            }
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    /// Consumes `rx` until it closes or `shutdown` fires, delivering up to
    /// `max_in_flight` messages at once. In-flight deliveries are awaited
    /// before returning.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<InboxMessage>,
        max_in_flight: usize,
        shutdown: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let inbox = self.clone();
            tasks.spawn(async move {
                if let Delivery::Rejected(e) = inbox.deliver(message).await {
                    tracing::warn!(error = %e, "Message rejected");
                }
                drop(permit);
            });
            // Reap finished deliveries so the set does not grow unbounded.
            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        tracing::debug!("Inbox stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Amount;
    use crate::domain::events::{CheckEvent, CheckType, SubmitPayment};
    use crate::domain::state::PaymentStatus;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::publisher::InMemoryPublisher;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    const NO_WAIT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff: Duration::ZERO,
    };

    async fn inbox() -> Arc<EventInbox> {
        let engine = SagaEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryPublisher::default()),
            SagaConfig::default(),
        );
        engine.open_account("alice", dec!(50)).await.unwrap();
        engine.open_account("bob", dec!(0)).await.unwrap();
        Arc::new(EventInbox::new(Arc::new(engine), NO_WAIT))
    }

    fn submit(id: &str, payee: &str) -> InboxMessage {
        InboxMessage::Submit(SubmitPayment {
            request_id: id.to_string(),
            amount: Amount::new(dec!(10)).unwrap(),
            payer: "alice".into(),
            payee: payee.into(),
            created_at: None,
        })
    }

    #[tokio::test]
    async fn test_unknown_payment_is_dead_lettered_after_retries() {
        let inbox = inbox().await;
        let message =
            InboxMessage::Check(CheckEvent::passed("ghost", CheckType::AuthCheck, Utc::now()));

        assert!(matches!(
            inbox.deliver(message.clone()).await,
            Delivery::DeadLettered
        ));
        let dead = inbox.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message, message);
        assert_eq!(dead[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_validation_error_is_rejected_without_retry() {
        let inbox = inbox().await;
        let delivery = inbox.deliver(submit("r1", "alice")).await;
        assert!(matches!(
            delivery,
            Delivery::Rejected(PaymentError::ValidationError(_))
        ));
        assert!(inbox.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_channel_until_closed() {
        let inbox = inbox().await;
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(inbox.clone().run(rx, 4, CancellationToken::new()));

        for i in 0..5 {
            tx.send(submit(&format!("r{i}"), "bob")).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let payments = inbox.engine().payments().await.unwrap();
        assert_eq!(payments.len(), 5);
        assert!(
            payments
                .iter()
                .all(|p| p.status == PaymentStatus::Processing)
        );
    }
}
