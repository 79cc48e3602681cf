//! Built-in demonstration handlers.
//!
//! Real deployments replace these with their own registrations; the
//! fallback keeps unknown task types flowing instead of dead-lettering
//! them on arrival.

use chrono::Utc;
use relayq_engine::HandlerRegistry;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Registers the demo handlers and the generic fallback.
pub fn register_all(registry: &HandlerRegistry) {
    registry.register("email", |task| {
        Box::pin(async move {
            info!(task_id = %task.id, "Sending email...");
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Some(json!({
                "status": "completed",
                "timestamp": Utc::now().to_rfc3339(),
            })))
        })
    });

    registry.register("image_resize", |task| {
        Box::pin(async move {
            info!(task_id = %task.id, "Resizing image...");
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Some(json!({
                "status": "completed",
                "timestamp": Utc::now().to_rfc3339(),
            })))
        })
    });

    registry.register("slow", |task| {
        Box::pin(async move {
            info!(task_id = %task.id, "Processing slow simulation task (5s)...");
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(json!({
                "status": "completed",
                "timestamp": Utc::now().to_rfc3339(),
            })))
        })
    });

    registry.register_fallback(|task| {
        Box::pin(async move {
            info!(
                task_id = %task.id,
                task_type = %task.task_type,
                retry_count = task.retry_count,
                "Processing task"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Some(json!({
                "status": "completed",
                "timestamp": Utc::now().to_rfc3339(),
            })))
        })
    });
}
