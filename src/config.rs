use std::str::FromStr;
use std::time::Duration;

/// Upper bound for the payment time limit: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Saga engine configuration.
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | EXPIRE_PAYMENT_TTL_SECONDS | 120 | Time limit before an open payment is declined |
/// | SWEEP_INTERVAL_MS | 5000 | Expiry sweeper tick |
/// | SETTLEMENT_QUEUE_CAPACITY | 64 | Bounded settlement work queue |
/// | FEED_CAPACITY | 100 | Per-account outbound feed bound |
/// | INBOX_MAX_ATTEMPTS | 3 | Delivery attempts before dead-lettering |
/// | INBOX_BACKOFF_MS | 6000 | Pause between delivery attempts |
/// | INBOX_MAX_IN_FLIGHT | 32 | Concurrent inbox deliveries |
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub expire_payment_ttl_secs: u64,
    pub sweep_interval: Duration,
    pub settlement_queue_capacity: usize,
    pub feed_capacity: usize,
    pub inbox_max_attempts: u32,
    pub inbox_backoff: Duration,
    pub inbox_max_in_flight: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            expire_payment_ttl_secs: 120,
            sweep_interval: Duration::from_millis(5000),
            settlement_queue_capacity: 64,
            feed_capacity: 100,
            inbox_max_attempts: 3,
            inbox_backoff: Duration::from_millis(6000),
            inbox_max_in_flight: 32,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl SagaConfig {
    /// Loads the configuration from environment variables, falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ttl_secs = env_or("EXPIRE_PAYMENT_TTL_SECONDS", defaults.expire_payment_ttl_secs);
        Self {
            expire_payment_ttl_secs: ttl_secs,
            sweep_interval: Duration::from_millis(env_or("SWEEP_INTERVAL_MS", 5000)),
            settlement_queue_capacity: env_or(
                "SETTLEMENT_QUEUE_CAPACITY",
                defaults.settlement_queue_capacity,
            ),
            feed_capacity: env_or("FEED_CAPACITY", defaults.feed_capacity),
            inbox_max_attempts: env_or("INBOX_MAX_ATTEMPTS", defaults.inbox_max_attempts),
            inbox_backoff: Duration::from_millis(env_or("INBOX_BACKOFF_MS", 6000)),
            inbox_max_in_flight: env_or("INBOX_MAX_IN_FLIGHT", defaults.inbox_max_in_flight),
        }
        .with_ttl_secs(ttl_secs)
    }

    /// Overrides the time limit, capped at [`MAX_TTL_SECS`].
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        if ttl_secs > MAX_TTL_SECS {
            tracing::warn!(ttl_secs, max = MAX_TTL_SECS, "Payment time limit too large, capping");
        }
        self.expire_payment_ttl_secs = ttl_secs.min(MAX_TTL_SECS);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SagaConfig::default();
        assert_eq!(config.expire_payment_ttl_secs, 120);
        assert_eq!(config.inbox_max_attempts, 3);
        assert_eq!(config.with_ttl_secs(60).expire_payment_ttl_secs, 60);
    }

    #[test]
    fn test_ttl_is_capped() {
        let config = SagaConfig::default().with_ttl_secs(u64::MAX);
        assert_eq!(config.expire_payment_ttl_secs, MAX_TTL_SECS);
        let config = SagaConfig::default().with_ttl_secs(MAX_TTL_SECS);
        assert_eq!(config.expire_payment_ttl_secs, MAX_TTL_SECS);
    }

    #[test]
    fn test_env_or_ignores_garbage() {
        assert_eq!(env_or("SAGA_PAY_TEST_UNSET_VARIABLE", 7u64), 7);
    }
}
