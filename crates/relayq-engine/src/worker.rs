//! Worker loop: pull, rate-check, execute, classify.

use crate::config::WorkerConfig;
use crate::engine::QueueEngine;
use crate::error::QueueResult;
use crate::metrics::{status, Metrics};
use crate::ratelimit::RateLimiter;
use crate::redis::keys;
use crate::results::ResultStore;
use crate::task::Task;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Error returned by a task handler.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Future returned by a task handler. `Ok(Some(value))` stores `value` as
/// the task result; `Ok(None)` completes without a result record.
pub type HandlerFuture = BoxFuture<'static, Result<Option<Value>, HandlerError>>;

/// A registered task handler.
pub type TaskHandler = Box<dyn Fn(Task) -> HandlerFuture + Send + Sync>;

/// Maps task types to handlers, with a fallback for unknown types.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, TaskHandler>>,
    fallback: RwLock<Option<TaskHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a task type.
    pub fn register(
        &self,
        task_type: impl Into<String>,
        handler: impl Fn(Task) -> HandlerFuture + Send + Sync + 'static,
    ) {
        let task_type = task_type.into();
        self.handlers
            .write()
            .insert(task_type.clone(), Box::new(handler));
        info!(task_type = %task_type, "Registered task handler");
    }

    /// Registers the handler used for task types with no dedicated handler.
    pub fn register_fallback(
        &self,
        handler: impl Fn(Task) -> HandlerFuture + Send + Sync + 'static,
    ) {
        *self.fallback.write() = Some(Box::new(handler));
        info!("Registered fallback task handler");
    }

    /// Builds the handler future for a task, if any handler matches.
    /// The registry lock is released before the future is awaited.
    fn dispatch(&self, task: &Task) -> Option<HandlerFuture> {
        {
            let handlers = self.handlers.read();
            if let Some(handler) = handlers.get(&task.task_type) {
                return Some(handler(task.clone()));
            }
        }
        let fallback = self.fallback.read();
        fallback.as_ref().map(|handler| handler(task.clone()))
    }
}

/// The pull-execute-classify loop a worker process runs.
pub struct Worker {
    engine: Arc<QueueEngine>,
    limiter: RateLimiter,
    results: ResultStore,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
}

impl Worker {
    /// Creates a worker over its collaborators.
    pub fn new(
        engine: Arc<QueueEngine>,
        limiter: RateLimiter,
        results: ResultStore,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            engine,
            limiter,
            results,
            registry,
            config,
            metrics,
        }
    }

    /// Runs cycles until the shutdown signal fires. Transient broker
    /// faults are logged and the loop continues; the affected task is
    /// still wherever the broker last put it.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            max_retries = self.config.max_retries,
            rate = self.config.rate_limit_per_sec,
            burst = self.config.rate_limit_burst,
            "Worker started, waiting for tasks"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Worker shutting down");
                    break;
                }
                result = self.cycle() => {
                    if let Err(e) = result {
                        if e.is_transient() {
                            warn!(error = %e, "Transient broker fault, continuing");
                        } else {
                            error!(error = %e, "Worker cycle failed");
                        }
                    }
                }
            }
        }
    }

    /// One cycle: dequeue, rate-check, dispatch, record the outcome.
    async fn cycle(&self) -> QueueResult<()> {
        let Some((task, identity)) = self.engine.dequeue().await? else {
            return Ok(());
        };

        // Denied tasks are delayed without consuming a retry slot.
        let bucket = keys::rate_limit(&task.task_type);
        match self
            .limiter
            .allow(
                &bucket,
                self.config.rate_limit_per_sec,
                self.config.rate_limit_burst,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(task_type = %task.task_type, "Rate limit exceeded, re-queueing");
                self.engine
                    .requeue(&task, &identity, self.config.requeue_delay())
                    .await?;
                return Ok(());
            }
            Err(e) => {
                // Fail open: a broken limiter must not strand tasks in-flight.
                error!(error = %e, "Rate limit check failed");
            }
        }

        let waited = (Utc::now() - task.created_at)
            .to_std()
            .unwrap_or_default();
        self.metrics
            .observe_latency(&task.task_type, waited.as_secs_f64());

        let started = Instant::now();
        let outcome = match self.registry.dispatch(&task) {
            Some(future) => future.await,
            None => {
                // No handler and no fallback is a deployment error, not a
                // task error. Dead-letter immediately.
                error!(task_type = %task.task_type, "No handler registered");
                self.engine.fail(&task, &identity).await?;
                self.metrics.record_processed(status::FAILED, &task.task_type);
                return Ok(());
            }
        };
        self.metrics
            .observe_duration(&task.task_type, started.elapsed().as_secs_f64());

        match outcome {
            Ok(summary) => {
                self.engine.complete(&identity).await?;
                if let Some(value) = summary {
                    if let Err(e) = self.results.set_result(&task.id, &value).await {
                        error!(task_id = %task.id, error = %e, "Failed to store task result");
                    }
                }
                self.metrics.record_processed(status::SUCCESS, &task.task_type);
                debug!(task_id = %task.id, "Task completed");
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Task failed");
                if task.retry_count < self.config.max_retries {
                    self.engine.retry(task.clone(), &identity).await?;
                    self.metrics.record_processed(status::RETRY, &task.task_type);
                } else {
                    self.engine.fail(&task, &identity).await?;
                    self.metrics.record_processed(status::FAILED, &task.task_type);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_dispatches_by_type() {
        let registry = HandlerRegistry::new();
        registry.register("email", |task| {
            Box::pin(async move { Ok(Some(json!({"handled": task.task_type}))) })
        });

        let task = Task::new("email", json!({}), Priority::Default);
        let outcome = registry.dispatch(&task).unwrap().await.unwrap();
        assert_eq!(outcome, Some(json!({"handled": "email"})));
    }

    #[tokio::test]
    async fn test_registry_falls_back_for_unknown_types() {
        let registry = HandlerRegistry::new();
        registry.register("email", |_| Box::pin(async { Ok(None) }));
        registry.register_fallback(|_| {
            Box::pin(async { Err(HandlerError::new("fell back")) })
        });

        let task = Task::new("mystery", json!({}), Priority::Default);
        let outcome = registry.dispatch(&task).unwrap().await;
        assert_eq!(outcome.unwrap_err().to_string(), "fell back");
    }

    #[test]
    fn test_registry_without_match_or_fallback() {
        let registry = HandlerRegistry::new();
        let task = Task::new("mystery", json!({}), Priority::Default);
        assert!(registry.dispatch(&task).is_none());
    }
}
