//! Health and status handlers

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - liveness check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub registered: usize,
    pub match_strategy: String,
    pub match_threshold: f32,
    pub require_student_fields: bool,
}

/// GET /status - registry size and matching settings
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        registered: state.store.len().await,
        match_strategy: state.config.match_strategy.to_string(),
        match_threshold: state.config.match_threshold,
        require_student_fields: state.config.require_student_fields,
    })
}
