//! Prometheus metrics for queue monitoring.
//!
//! Instruments are registered once on a dedicated registry and recorded
//! through the `Metrics` handle. The worker binary exposes the registry on
//! its `/metrics` endpoint.

use crate::engine::QueueEngine;
use crate::error::QueueResult;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};

/// Outcome label values for `relayq_processed_total`.
pub mod status {
    /// Handler succeeded; task completed.
    pub const SUCCESS: &str = "success";
    /// Handler failed; task scheduled for retry.
    pub const RETRY: &str = "retry";
    /// Retries exhausted; task dead-lettered.
    pub const FAILED: &str = "failed";
}

/// Metrics handle containing all instruments.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    processed_total: CounterVec,
    task_duration: HistogramVec,
    queue_depth: GaugeVec,
    queue_latency: HistogramVec,
    promoted_total: Counter,
}

impl Metrics {
    /// Creates and registers all instruments on a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let processed_total = CounterVec::new(
            Opts::new("relayq_processed_total", "Total number of processed tasks"),
            &["status", "type"],
        )?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "relayq_task_duration_seconds",
                "Duration of task handler execution",
            ),
            &["type"],
        )?;

        let queue_depth = GaugeVec::new(
            Opts::new("relayq_queue_depth", "Number of tasks in each queue"),
            &["queue"],
        )?;

        let queue_latency = HistogramVec::new(
            HistogramOpts::new(
                "relayq_queue_latency_seconds",
                "Time from enqueue to handler dispatch",
            ),
            &["type"],
        )?;

        let promoted_total = Counter::new(
            "relayq_promoted_total",
            "Total delayed tasks promoted back to ready queues",
        )?;

        registry.register(Box::new(processed_total.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_latency.clone()))?;
        registry.register(Box::new(promoted_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            processed_total,
            task_duration,
            queue_depth,
            queue_latency,
            promoted_total,
        })
    }

    /// Returns the backing registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a processed task outcome.
    pub fn record_processed(&self, outcome: &str, task_type: &str) {
        self.processed_total
            .with_label_values(&[outcome, task_type])
            .inc();
    }

    /// Observes handler execution time.
    pub fn observe_duration(&self, task_type: &str, seconds: f64) {
        self.task_duration
            .with_label_values(&[task_type])
            .observe(seconds);
    }

    /// Observes time spent in queue before dispatch.
    pub fn observe_latency(&self, task_type: &str, seconds: f64) {
        self.queue_latency
            .with_label_values(&[task_type])
            .observe(seconds);
    }

    /// Updates the depth gauge for one queue.
    pub fn set_queue_depth(&self, queue: &str, depth: i64) {
        self.queue_depth
            .with_label_values(&[queue])
            .set(depth as f64);
    }

    /// Adds promoted delayed tasks to the promotion counter.
    pub fn add_promoted(&self, count: u64) {
        self.promoted_total.inc_by(count as f64);
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }
        String::from_utf8(buffer).unwrap_or_else(|e| format!("# Error encoding metrics: {}\n", e))
    }
}

/// Refreshes the queue depth gauges from the broker until shutdown.
pub async fn run_depth_collector(
    engine: Arc<QueueEngine>,
    metrics: Arc<Metrics>,
    refresh: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(refresh_secs = refresh.as_secs(), "Queue depth collector started");
    let mut ticker = interval(refresh);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Queue depth collector shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = refresh_depths(&engine, &metrics).await {
                    error!(error = %e, "Queue depth refresh failed");
                }
            }
        }
    }
}

async fn refresh_depths(engine: &QueueEngine, metrics: &Metrics) -> QueueResult<()> {
    let depths = engine.queue_depths().await?;
    for (queue, depth) in depths {
        metrics.set_queue_depth(&queue, depth);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_register_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_processed(status::SUCCESS, "email");
        metrics.record_processed(status::RETRY, "email");
        metrics.observe_duration("email", 0.2);
        metrics.observe_latency("email", 1.5);
        metrics.set_queue_depth("queue:default", 7);
        metrics.add_promoted(3);

        let rendered = metrics.render();
        assert!(rendered.contains("relayq_processed_total"));
        assert!(rendered.contains("relayq_task_duration_seconds"));
        assert!(rendered.contains("relayq_queue_depth"));
        assert!(rendered.contains("relayq_queue_latency_seconds"));
        assert!(rendered.contains("relayq_promoted_total"));
    }

    #[test]
    fn test_fresh_registries_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_processed(status::FAILED, "email");
        assert!(!second.render().contains("failed"));
    }
}
