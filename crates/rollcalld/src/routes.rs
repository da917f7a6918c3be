//! Router configuration
//!
//! Wires the endpoints, body limits and request tracing.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, list_students, match_handler, register_handler, status};
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes() + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/register", post(register_handler))
        .route("/match", post(match_handler))
        .route("/students", get(list_students))
        .route("/status", get(status))
        .route("/health", get(health))
        .with_state(state)
        // axum's own multipart cap (2 MB) would otherwise win
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}
