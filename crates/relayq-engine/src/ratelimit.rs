//! Per-key token bucket rate limiting.

use crate::error::QueueResult;
use crate::redis::Broker;
use chrono::Utc;

/// Token bucket limiter evaluated atomically on the broker.
///
/// Denial is a routing signal, not an error: `allow` only errors on broker
/// faults. State per key is a hash `{tokens, last_refill}` with second
/// resolution, refilled lazily on each check.
#[derive(Clone)]
pub struct RateLimiter {
    broker: Broker,
}

impl RateLimiter {
    /// Creates a limiter over a broker adapter.
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }

    /// Checks whether one token is available under `key`, consuming it if
    /// so. `rate` is tokens per second, `burst` the bucket capacity.
    pub async fn allow(&self, key: &str, rate: u32, burst: u32) -> QueueResult<bool> {
        let now = Utc::now().timestamp();
        self.broker.token_bucket(key, rate, burst, now, 1).await
    }
}
