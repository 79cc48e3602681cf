//! Task model and priority definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a task ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the task ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task priority levels.
///
/// Priorities select the ready queue a task joins and are strictly
/// preferred at dequeue time: a worker always drains `High` before
/// `Default` before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
#[repr(u8)]
pub enum Priority {
    /// Background work.
    Low = 0,
    /// Normal priority.
    Default = 1,
    /// Time-sensitive work.
    High = 2,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        match value {
            0 => Priority::Low,
            1 => Priority::Default,
            _ => Priority::High,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Default => write!(f, "default"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A unit of work flowing through the queue.
///
/// The `payload` is opaque to the engine; workers route on `task_type` and
/// interpret the payload themselves. `retry_count` is incremented only by
/// the retry transition, and `created_at` survives retries unchanged.
///
/// Field order is part of the wire contract: the JSON string produced at
/// enqueue doubles as the identity token used to remove the task from the
/// in-flight list, so encoding must stay deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (UUID v4).
    pub id: TaskId,

    /// Routing tag used for handler dispatch and metrics.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Opaque job data.
    pub payload: Value,

    /// Stamped at first enqueue, preserved through retries.
    pub created_at: DateTime<Utc>,

    /// Number of retry transitions this task has gone through.
    pub retry_count: u32,

    /// Ready-queue selector.
    pub priority: Priority,
}

impl Task {
    /// Creates a task with a fresh ID and `created_at = now`.
    pub fn new(task_type: impl Into<String>, payload: Value, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_id_generation() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_priority_from_u8() {
        assert_eq!(Priority::from(0), Priority::Low);
        assert_eq!(Priority::from(1), Priority::Default);
        assert_eq!(Priority::from(2), Priority::High);
        assert_eq!(Priority::from(200), Priority::High);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Default);
        assert!(Priority::Default > Priority::Low);
    }

    #[test]
    fn test_priority_serializes_as_integer() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "2");
        let back: Priority = serde_json::from_str("0").unwrap();
        assert_eq!(back, Priority::Low);
    }

    #[test]
    fn test_task_round_trip() {
        let task = Task::new("email", json!({"to": "user@example.com"}), Priority::Default);
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(task, decoded);
    }

    #[test]
    fn test_task_encoding_is_deterministic() {
        let task = Task::new("email", json!({"to": "a@b.c"}), Priority::High);
        let first = serde_json::to_string(&task).unwrap();
        let second = serde_json::to_string(&task).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_retried_task_encodes_differently() {
        let task = Task::new("email", json!({}), Priority::Default);
        let original = serde_json::to_string(&task).unwrap();
        let mut retried = task.clone();
        retried.retry_count += 1;
        let encoded = serde_json::to_string(&retried).unwrap();
        assert_ne!(original, encoded);
        assert_eq!(retried.created_at, task.created_at);
    }

    #[test]
    fn test_type_field_name_on_wire() {
        let task = Task::new("report", json!(null), Priority::Low);
        let value: Value = serde_json::from_str(&serde_json::to_string(&task).unwrap()).unwrap();
        assert_eq!(value["type"], "report");
        assert_eq!(value["priority"], 0);
    }
}
