#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use saga_pay::application::engine::SagaEngine;
use saga_pay::config::SagaConfig;
use saga_pay::domain::account::Amount;
use saga_pay::domain::events::{CheckEvent, CheckType, ConfirmationDecision, SubmitPayment};
use saga_pay::infrastructure::in_memory::InMemoryStore;
use saga_pay::infrastructure::publisher::InMemoryPublisher;
use std::sync::Arc;

pub const TTL: u64 = 120;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub struct Harness {
    pub engine: Arc<SagaEngine>,
    pub store: InMemoryStore,
    pub publisher: Arc<InMemoryPublisher>,
}

pub async fn harness(accounts: &[(&str, Decimal)]) -> Harness {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::default());
    let engine = SagaEngine::new(
        Arc::new(store.clone()),
        publisher.clone(),
        SagaConfig::default().with_ttl_secs(TTL),
    );
    for (id, balance) in accounts {
        engine.open_account(*id, *balance).await.unwrap();
    }
    Harness {
        engine: Arc::new(engine),
        store,
        publisher,
    }
}

pub fn request(id: &str, amount: Decimal, payer: &str, payee: &str) -> SubmitPayment {
    SubmitPayment {
        request_id: id.to_string(),
        amount: Amount::new(amount).unwrap(),
        payer: payer.into(),
        payee: payee.into(),
        created_at: Some(t0()),
    }
}

pub fn passed(id: &str, check: CheckType, secs: i64) -> CheckEvent {
    CheckEvent::passed(id, check, at(secs))
}

pub fn decision(id: &str, confirmed: bool) -> ConfirmationDecision {
    ConfirmationDecision {
        request_id: id.to_string(),
        confirmed,
    }
}

/// Submits `request` and passes every check at `secs`.
pub async fn to_waiting(engine: &SagaEngine, request: SubmitPayment, secs: i64) {
    let id = request.request_id.clone();
    engine.submit_at(request, t0()).await.unwrap();
    for check in CheckType::ALL {
        engine.apply_check(passed(&id, check, secs)).await.unwrap();
    }
}
