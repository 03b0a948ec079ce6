use crate::domain::account::AccountId;
use crate::domain::events::{PaymentView, PendingConfirmation};
use crate::domain::payment::Payment;
use crate::domain::ports::OutcomePublisher;
use crate::domain::state::PaymentStatus;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{RwLock, broadcast};

/// In-process outcome publisher.
///
/// Keeps one bounded feed of recent changes per account (oldest entries are
/// evicted when a feed is full, and a feed is emptied when it is drained), a
/// cache of pending confirmations keyed by request id, and a broadcast topic
/// for downstream consumers.
pub struct InMemoryPublisher {
    feeds: RwLock<HashMap<AccountId, VecDeque<PaymentView>>>,
    pending: RwLock<HashMap<String, PendingConfirmation>>,
    downstream: broadcast::Sender<PaymentView>,
    feed_capacity: usize,
}

impl InMemoryPublisher {
    pub fn new(feed_capacity: usize, topic_capacity: usize) -> Self {
        let (downstream, _) = broadcast::channel(topic_capacity.max(1));
        Self {
            feeds: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            downstream,
            feed_capacity: feed_capacity.max(1),
        }
    }

    /// Subscribes to every committed saga outcome.
    pub fn subscribe(&self) -> broadcast::Receiver<PaymentView> {
        self.downstream.subscribe()
    }

    /// Hands over and forgets everything queued for `account`.
    pub async fn drain_feed(&self, account: &AccountId) -> Vec<PaymentView> {
        let mut feeds = self.feeds.write().await;
        feeds
            .remove(account)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Pending confirmations the given payee still has to answer.
    pub async fn pending_for(&self, payee: &AccountId) -> Vec<PendingConfirmation> {
        let pending = self.pending.read().await;
        let mut items: Vec<PendingConfirmation> = pending
            .values()
            .filter(|p| &p.payee == payee)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        items
    }

    pub async fn pending(&self, request_id: &str) -> Option<PendingConfirmation> {
        self.pending.read().await.get(request_id).cloned()
    }

    async fn push(&self, account: &AccountId, view: PaymentView) {
        let mut feeds = self.feeds.write().await;
        let feed = feeds.entry(account.clone()).or_default();
        if feed.len() == self.feed_capacity {
            feed.pop_front();
        }
        feed.push_back(view);
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new(100, 1024)
    }
}

#[async_trait]
impl OutcomePublisher for InMemoryPublisher {
    async fn publish_saga_outcome(&self, payment: &Payment) {
        let view = PaymentView::from(payment);
        tracing::debug!(request_id = %view.request_id, status = %view.status, "Publishing saga outcome");

        // Payees only hear about money that actually arrived.
        if view.status == PaymentStatus::Completed {
            self.push(&view.payee, view.clone()).await;
        }
        self.push(&view.payer, view.clone()).await;

        // No subscribers is not an error.
        let _ = self.downstream.send(view);
    }

    async fn publish_pending_confirmation(&self, pending: PendingConfirmation) {
        tracing::debug!(
            request_id = %pending.request_id,
            remaining_secs = pending.remaining_time_in_seconds,
            "Payment awaiting confirmation"
        );
        self.pending
            .write()
            .await
            .insert(pending.request_id.clone(), pending);
    }

    async fn clear_pending_confirmation(&self, request_id: &str) {
        self.pending.write().await.remove(request_id);
    }
}
