//! Liveness and job counts.

use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: &'static str,
    /// Jobs that have not reached a terminal status.
    pub active_jobs: usize,
    /// All registered jobs.
    pub total_jobs: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_jobs: state.registry.active_count(),
        total_jobs: state.registry.len(),
    })
}
