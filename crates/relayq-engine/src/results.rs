//! Keyed result records with bounded retention.

use crate::error::QueueResult;
use crate::redis::{keys, Broker};
use crate::task::TaskId;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Result record time-to-live.
pub const RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Stores handler results under `result:<task-id>` with a 24-hour TTL.
///
/// Result records are orthogonal to queue state; a missing record is a
/// normal outcome, not an error.
#[derive(Clone)]
pub struct ResultStore {
    broker: Broker,
}

impl ResultStore {
    /// Creates a result store over a broker adapter.
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }

    /// JSON-encodes `value` and writes it under the task's result key.
    pub async fn set_result(&self, task_id: &TaskId, value: &Value) -> QueueResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.broker
            .set_with_ttl(&keys::result(task_id), &encoded, RESULT_TTL)
            .await?;
        debug!(task_id = %task_id, "Stored task result");
        Ok(())
    }

    /// Returns the raw JSON result, or `None` when absent or expired.
    pub async fn get_result(&self, task_id: &TaskId) -> QueueResult<Option<String>> {
        self.broker.get(&keys::result(task_id)).await
    }
}
