//! Shared application state for the producer API.

use relayq_engine::{CronRegistrar, QueueEngine, ResultStore};
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Queue engine.
    pub engine: Arc<QueueEngine>,

    /// Cron registrar backing `POST /schedule`.
    pub cron: Arc<CronRegistrar>,

    /// Result store backing `GET /result`.
    pub results: Arc<ResultStore>,

    /// Configured API key. Empty disables authentication.
    pub api_key: Arc<String>,
}

impl AppState {
    /// Creates the application state.
    pub fn new(
        engine: Arc<QueueEngine>,
        cron: Arc<CronRegistrar>,
        results: Arc<ResultStore>,
        api_key: String,
    ) -> Self {
        Self {
            engine,
            cron,
            results,
            api_key: Arc::new(api_key),
        }
    }
}
