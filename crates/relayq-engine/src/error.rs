//! Queue error types.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the queue engine and its collaborators.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Task serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Invalid cron or interval specification.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns true if the error is a transient broker fault.
    ///
    /// The worker loop keeps running on transient faults; the task it was
    /// about to touch is still where the broker last put it.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Redis(_) | QueueError::Pool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_is_not_transient() {
        let err = QueueError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_error_is_transient() {
        let err = QueueError::Pool(deadpool_redis::PoolError::Closed);
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_schedule_display() {
        let err = QueueError::InvalidSchedule("bad spec".into());
        assert!(err.to_string().contains("bad spec"));
    }

    #[test]
    fn test_configuration_error_is_not_transient() {
        let err = QueueError::Configuration("missing addr".into());
        assert!(!err.is_transient());
    }
}
