//! API key authentication middleware.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Rejects requests whose `X-API-Key` does not match the configured key.
///
/// An empty configured key disables authentication entirely. CORS preflight
/// never reaches this middleware; the CORS layer sits outside it and
/// answers `OPTIONS` itself.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_key.is_empty() {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == state.api_key.as_str() => next.run(request).await,
        _ => {
            debug!("Rejected request with missing or invalid API key");
            (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response()
        }
    }
}
