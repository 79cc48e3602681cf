//! Delay scheduler: promotes due tasks back into the ready queues.

use crate::error::QueueResult;
use crate::metrics::Metrics;
use crate::redis::Broker;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Promotion tick interval.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Moves due members of the delay set into the ready queues.
///
/// The collect-and-remove step runs as one server-side script, so running
/// more than one scheduler replica is safe: each delayed task is promoted
/// at most once no matter how many replicas tick simultaneously.
pub struct DelayScheduler {
    broker: Broker,
    tick: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl DelayScheduler {
    /// Creates a scheduler with the default 500 ms tick.
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            tick: TICK_INTERVAL,
            metrics: None,
        }
    }

    /// Overrides the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Records promotion counts on the given metrics handle.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs one promotion pass. Returns the number of promoted tasks.
    pub async fn tick_once(&self) -> QueueResult<i64> {
        let now_ns = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let promoted = self.broker.promote_due(now_ns).await?;

        if promoted > 0 {
            debug!(count = promoted, "Promoted delayed tasks");
            if let Some(metrics) = &self.metrics {
                metrics.add_promoted(promoted as u64);
            }
        }

        Ok(promoted)
    }

    /// Ticks every 500 ms until the shutdown signal fires. Broker faults
    /// are logged and the loop keeps going; broker state is unchanged on
    /// a failed script invocation.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(tick_ms = self.tick.as_millis() as u64, "Delay scheduler started");
        let mut ticker = interval(self.tick);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Delay scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        error!(error = %e, "Scheduler promotion failed");
                    }
                }
            }
        }
    }
}
