//! relayq engine - Redis-backed distributed task queue
//!
//! The broker is the only source of truth: producers, workers, and the
//! background promoter coordinate exclusively through atomic broker
//! operations. The engine provides:
//!
//! - Priority-ordered, at-least-once delivery with atomic visibility
//!   transfer (BLMOVE into a shared in-flight list)
//! - Exponential-backoff retry through a delayed re-injection loop
//! - A dead-letter list for tasks whose retries are exhausted
//! - Per-type token bucket rate limiting evaluated on the broker
//! - Cron-driven recurring enqueue
//! - Result records with bounded retention
//!
//! # Example
//!
//! ```rust,ignore
//! use relayq_engine::{create_pool, Broker, Priority, QueueEngine, Task};
//! use serde_json::json;
//!
//! let pool = create_pool(&config.redis).await?;
//! let engine = QueueEngine::new(Broker::new(pool));
//!
//! let task = Task::new("email", json!({"to": "user@example.com"}), Priority::High);
//! engine.enqueue(&task).await?;
//!
//! if let Some((task, identity)) = engine.dequeue().await? {
//!     // ... run the handler ...
//!     engine.complete(&identity).await?;
//! }
//! ```

pub mod config;
pub mod cron;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod ratelimit;
pub mod redis;
pub mod results;
pub mod scheduler;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use config::{AppConfig, MetricsConfig, RedisConfig, ServerConfig, WorkerConfig};
pub use cron::{CronRegistrar, EntryId};
pub use engine::{retry_backoff, QueueEngine, COMPLETED_CAP, DEQUEUE_POLL_TIMEOUT};
pub use error::{QueueError, QueueResult};
pub use metrics::{run_depth_collector, Metrics};
pub use ratelimit::RateLimiter;
pub use redis::{create_pool, keys, Broker};
pub use results::{ResultStore, RESULT_TTL};
pub use scheduler::DelayScheduler;
pub use task::{Priority, Task, TaskId};
pub use worker::{HandlerError, HandlerFuture, HandlerRegistry, TaskHandler, Worker};

/// Re-export of commonly used types.
pub mod prelude {
    pub use crate::engine::QueueEngine;
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::task::{Priority, Task, TaskId};
    pub use crate::worker::{HandlerError, HandlerRegistry};
}
