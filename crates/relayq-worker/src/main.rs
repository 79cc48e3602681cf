//! relayq worker process.
//!
//! Pulls tasks from the broker, executes handlers, and records outcomes.
//! Also runs the delay scheduler, the queue-depth collector, and the
//! Prometheus `/metrics` endpoint.

mod handlers;

use axum::{extract::State, routing::get, Router};
use relayq_engine::{
    create_pool, run_depth_collector, telemetry, AppConfig, Broker, DelayScheduler,
    HandlerRegistry, Metrics, QueueEngine, QueueResult, RateLimiter, ResultStore, Worker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env();
    telemetry::init_logging(&config.environment);

    info!("Starting relayq worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> QueueResult<()> {
    let pool = create_pool(&config.redis).await?;
    let broker = Broker::new(pool);
    let engine = Arc::new(QueueEngine::new(broker.clone()));
    let limiter = RateLimiter::new(broker.clone());
    let results = ResultStore::new(broker.clone());

    let metrics = Arc::new(
        Metrics::new()
            .map_err(|e| relayq_engine::QueueError::Configuration(format!("metrics: {}", e)))?,
    );

    let registry = Arc::new(HandlerRegistry::new());
    handlers::register_all(&registry);

    let (shutdown_tx, _) = broadcast::channel(1);

    // Delay scheduler: promotes due tasks back into the ready queues.
    let scheduler = DelayScheduler::new(broker.clone()).with_metrics(metrics.clone());
    let scheduler_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    // Queue depth gauges.
    tokio::spawn(run_depth_collector(
        engine.clone(),
        metrics.clone(),
        Duration::from_secs(config.metrics.depth_interval_secs),
        shutdown_tx.subscribe(),
    ));

    // Prometheus exposition.
    let metrics_addr = config.metrics.bind_addr.clone();
    let metrics_handle = metrics.clone();
    let metrics_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(&metrics_addr, metrics_handle, metrics_shutdown).await {
            error!(error = %e, "Metrics server failed");
        }
    });

    // Translate process signals into the broadcast shutdown.
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    });

    let worker = Worker::new(
        engine,
        limiter,
        results,
        registry,
        config.worker.clone(),
        metrics,
    );
    worker.run(shutdown_tx.subscribe()).await;

    info!("Worker shutdown complete");
    Ok(())
}

/// Serves `GET /metrics` until the shutdown signal fires.
async fn serve_metrics(
    addr: &str,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> QueueResult<()> {
    let router = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        relayq_engine::QueueError::Configuration(format!("Failed to bind {}: {}", addr, e))
    })?;

    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| relayq_engine::QueueError::Internal(format!("Metrics server error: {}", e)))
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.render()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down worker...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down worker...");
        }
    }
}
