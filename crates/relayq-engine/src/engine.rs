//! Queue engine: enqueue, dequeue, and the outcome transitions.
//!
//! Every mutation is a single broker command or an atomic pipeline, so a
//! task is always in exactly one of: a ready queue, the in-flight list,
//! the delay set, or the dead-letter list. The completed list is a bounded
//! history shadow and never read back by the engine.

use crate::error::QueueResult;
use crate::redis::{keys, Broker};
use crate::task::Task;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a single ready queue is polled before falling through to the
/// next lower priority.
pub const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Completed-list retention, in entries.
pub const COMPLETED_CAP: i64 = 100;

/// Base unit of the exponential retry backoff.
const BACKOFF_BASE_MS: u64 = 100;

/// Computes the retry backoff for a task that has reached `retry_count`
/// retries: `2^retry_count * 100ms`, saturating on absurd counts.
pub fn retry_backoff(retry_count: u32) -> Duration {
    let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
    Duration::from_millis(factor.saturating_mul(BACKOFF_BASE_MS))
}

/// The queue engine. Cheap to clone; all state lives on the broker.
#[derive(Clone)]
pub struct QueueEngine {
    broker: Broker,
}

impl QueueEngine {
    /// Creates an engine over a broker adapter.
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }

    /// Returns the underlying broker adapter.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Serializes the task and appends it to the ready queue matching its
    /// priority.
    pub async fn enqueue(&self, task: &Task) -> QueueResult<()> {
        let raw = Broker::encode_task(task)?;
        let queue = keys::ready_queue(task.priority);
        self.broker.push_right(queue, &raw).await?;

        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            queue = queue,
            "Enqueued task"
        );
        Ok(())
    }

    /// Attempts an atomic blocking move from each ready queue in strict
    /// priority order into the in-flight list.
    ///
    /// Each queue is polled for one second before falling through, so a
    /// full miss takes up to three seconds. Priorities carry no weighting
    /// or aging: sustained high-priority load starves lower queues.
    ///
    /// Returns the decoded task and its identity token: the exact string
    /// moved by the broker, needed later to remove this copy from the
    /// in-flight list.
    pub async fn dequeue(&self) -> QueueResult<Option<(Task, String)>> {
        for queue in keys::READY_QUEUES {
            let moved = self
                .broker
                .blocking_move(queue, keys::PROCESSING, DEQUEUE_POLL_TIMEOUT)
                .await?;

            if let Some(raw) = moved {
                let task = Broker::decode_task(&raw)?;
                debug!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    queue = queue,
                    retry_count = task.retry_count,
                    "Dequeued task"
                );
                return Ok(Some((task, raw)));
            }
        }

        Ok(None)
    }

    /// Removes the identity token from the in-flight list without
    /// recording history.
    pub async fn ack(&self, identity: &str) -> QueueResult<()> {
        let removed = self.broker.remove_first(keys::PROCESSING, identity).await?;
        if removed == 0 {
            warn!("Ack found no matching in-flight entry");
        }
        Ok(())
    }

    /// Moves the identity token from the in-flight list to the completed
    /// list, keeping only the trailing 100 entries. One atomic pipeline.
    pub async fn complete(&self, identity: &str) -> QueueResult<()> {
        let removed = self.broker.swap_to_completed(identity, COMPLETED_CAP).await?;
        if removed == 0 {
            warn!("Complete found no matching in-flight entry");
        }
        Ok(())
    }

    /// Schedules a retry with exponential backoff.
    ///
    /// Increments `retry_count`, re-serializes (the fresh encoding is a new
    /// delay-set member), and atomically adds the fresh form to the delay
    /// set while removing the original identity token from the in-flight
    /// list. The due time is `now + 2^retry_count * 100ms`.
    pub async fn retry(&self, mut task: Task, identity: &str) -> QueueResult<()> {
        task.retry_count += 1;
        let backoff = retry_backoff(task.retry_count);
        let due = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default();
        let score = due.timestamp_nanos_opt().unwrap_or(i64::MAX) as f64;

        let fresh = Broker::encode_task(&task)?;
        let removed = self.broker.swap_to_delayed(&fresh, score, identity).await?;
        if removed == 0 {
            warn!(task_id = %task.id, "Retry found no matching in-flight entry");
        }

        debug!(
            task_id = %task.id,
            retry_count = task.retry_count,
            backoff_ms = backoff.as_millis() as u64,
            "Scheduled task retry"
        );
        Ok(())
    }

    /// Delays a task without consuming a retry slot.
    ///
    /// Used for rate-limit denials: the task re-enters the delay set under
    /// its current encoding with `retry_count` unchanged, so sustained
    /// overload cannot push it toward the dead-letter list.
    pub async fn requeue(&self, task: &Task, identity: &str, delay: Duration) -> QueueResult<()> {
        let due = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let score = due.timestamp_nanos_opt().unwrap_or(i64::MAX) as f64;

        let removed = self.broker.swap_to_delayed(identity, score, identity).await?;
        if removed == 0 {
            warn!(task_id = %task.id, "Requeue found no matching in-flight entry");
        }

        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            delay_ms = delay.as_millis() as u64,
            "Re-queued task without retry charge"
        );
        Ok(())
    }

    /// Moves a permanently failed task to the dead-letter list.
    pub async fn fail(&self, task: &Task, identity: &str) -> QueueResult<()> {
        let payload = Broker::encode_task(task)?;
        let removed = self.broker.swap_to_dead_letter(&payload, identity).await?;
        if removed == 0 {
            warn!(task_id = %task.id, "Fail found no matching in-flight entry");
        }

        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Moved task to dead-letter queue"
        );
        Ok(())
    }

    /// Point-in-time depth of every queue. Observation only; the counts
    /// are not mutually consistent under concurrent mutation.
    pub async fn queue_depths(&self) -> QueueResult<HashMap<String, i64>> {
        let mut depths = HashMap::new();

        for queue in keys::ALL_LISTS {
            depths.insert(queue.to_string(), self.broker.list_len(queue).await?);
        }
        depths.insert(
            keys::DELAYED.to_string(),
            self.broker.sorted_len(keys::DELAYED).await?,
        );

        Ok(depths)
    }

    /// Reads up to `limit` tasks from the head of the named queue without
    /// removing them. The delay set is read ascending by score. Entries
    /// that fail to decode are skipped.
    pub async fn inspect(&self, queue_name: &str, limit: i64) -> QueueResult<Vec<Task>> {
        let raw_entries = if queue_name == keys::DELAYED {
            self.broker.sorted_range(queue_name, limit).await?
        } else {
            self.broker.list_range(queue_name, limit).await?
        };

        let mut tasks = Vec::with_capacity(raw_entries.len());
        for raw in raw_entries {
            match Broker::decode_task(&raw) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    debug!(queue = queue_name, error = %e, "Skipping malformed queue entry");
                }
            }
        }

        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(retry_backoff(1), Duration::from_millis(200));
        assert_eq!(retry_backoff(2), Duration::from_millis(400));
        assert_eq!(retry_backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_saturates() {
        // A corrupted retry count must not overflow the shift.
        let huge = retry_backoff(200);
        assert!(huge >= retry_backoff(60));
    }

    #[test]
    fn test_dequeue_poll_timeout_is_one_second() {
        assert_eq!(DEQUEUE_POLL_TIMEOUT, Duration::from_secs(1));
    }
}
