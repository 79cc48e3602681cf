//! Redis broker adapter.

mod broker;

pub use broker::Broker;

use crate::config::RedisConfig;
use crate::error::{QueueError, QueueResult};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Creates a Redis connection pool and verifies connectivity with a PING.
pub async fn create_pool(config: &RedisConfig) -> QueueResult<Pool> {
    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| QueueError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| QueueError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!(url = %config.url, pool_size = config.pool_size, "Redis connection pool created");

    Ok(pool)
}

/// Broker key layout.
///
/// These names are part of the stable wire contract shared with dashboards
/// and operational tooling; do not rename them.
pub mod keys {
    use crate::task::{Priority, TaskId};

    /// Ready queue for high-priority tasks.
    pub const QUEUE_HIGH: &str = "queue:high";
    /// Ready queue for default-priority tasks.
    pub const QUEUE_DEFAULT: &str = "queue:default";
    /// Ready queue for low-priority tasks.
    pub const QUEUE_LOW: &str = "queue:low";
    /// In-flight list holding tasks currently held by a worker.
    pub const PROCESSING: &str = "processing_queue";
    /// Terminal storage for tasks whose retries were exhausted.
    pub const DEAD_LETTER: &str = "dead_letter_queue";
    /// Bounded history of recently completed tasks.
    pub const COMPLETED: &str = "completed_queue";
    /// Sorted set of delayed tasks, scored by due time in nanoseconds.
    pub const DELAYED: &str = "delayed_queue";

    /// Ready queues in strict dequeue preference order.
    pub const READY_QUEUES: [&str; 3] = [QUEUE_HIGH, QUEUE_DEFAULT, QUEUE_LOW];

    /// All list-typed queues plus the delay set, for depth reporting.
    pub const ALL_LISTS: [&str; 6] = [
        QUEUE_HIGH,
        QUEUE_DEFAULT,
        QUEUE_LOW,
        PROCESSING,
        DEAD_LETTER,
        COMPLETED,
    ];

    /// Maps a priority to its ready queue.
    pub fn ready_queue(priority: Priority) -> &'static str {
        match priority {
            Priority::High => QUEUE_HIGH,
            Priority::Default => QUEUE_DEFAULT,
            Priority::Low => QUEUE_LOW,
        }
    }

    /// Result record key for a task.
    pub fn result(task_id: &TaskId) -> String {
        format!("result:{}", task_id)
    }

    /// Token bucket key for a task type.
    pub fn rate_limit(task_type: &str) -> String {
        format!("ratelimit:{}", task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use crate::task::{Priority, TaskId};

    #[test]
    fn test_ready_queue_mapping() {
        assert_eq!(keys::ready_queue(Priority::High), "queue:high");
        assert_eq!(keys::ready_queue(Priority::Default), "queue:default");
        assert_eq!(keys::ready_queue(Priority::Low), "queue:low");
    }

    #[test]
    fn test_ready_queues_are_in_preference_order() {
        assert_eq!(keys::READY_QUEUES, ["queue:high", "queue:default", "queue:low"]);
    }

    #[test]
    fn test_derived_keys() {
        let id = TaskId::from_string("abc-123");
        assert_eq!(keys::result(&id), "result:abc-123");
        assert_eq!(keys::rate_limit("email"), "ratelimit:email");
    }
}
