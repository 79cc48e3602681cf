//! Producer API router assembly.

use crate::{controllers::queue_controller, middleware::require_api_key, state::AppState};
use axum::{middleware, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Builds the full producer API router.
///
/// Layer order matters: the CORS layer sits outside authentication so
/// browser preflight requests get their 200 before any key check runs.
pub fn create_router(state: AppState) -> Router {
    let router = queue_controller::router()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Producer API router created");
    router
}

/// Permissive CORS: any origin, any method, any header.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
