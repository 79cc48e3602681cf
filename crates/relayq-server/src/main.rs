//! relayq producer API server.
//!
//! Accepts task submissions and cron registrations over HTTP and hosts the
//! in-process cron registrar. Workers run separately; see `relayq-worker`.

use relayq_engine::{
    create_pool, telemetry, AppConfig, Broker, CronRegistrar, QueueEngine, QueueResult, ResultStore,
};
use relayq_rest::{create_router, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env();
    telemetry::init_logging(&config.environment);

    info!("Starting relayq server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> QueueResult<()> {
    if config.server.api_key.is_empty() {
        warn!("API_KEY not set, authentication disabled");
    } else {
        info!("API authentication enabled");
    }

    let pool = create_pool(&config.redis).await?;
    let broker = Broker::new(pool);
    let engine = Arc::new(QueueEngine::new(broker.clone()));
    let results = Arc::new(ResultStore::new(broker));
    let cron = Arc::new(CronRegistrar::new(engine.clone()));

    cron.start();

    let state = AppState::new(engine, cron.clone(), results, config.server.api_key.clone());
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|e| {
            relayq_engine::QueueError::Configuration(format!(
                "Failed to bind {}: {}",
                config.server.bind_addr, e
            ))
        })?;

    info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| relayq_engine::QueueError::Internal(format!("Server error: {}", e)))?;

    cron.stop();
    info!("Server shutdown complete");
    Ok(())
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
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
