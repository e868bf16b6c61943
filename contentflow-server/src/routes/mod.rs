//! Route tables.

pub mod health;
pub mod jobs;
pub mod stream;

use crate::AppState;
use axum::Router;

/// Routes mounted under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(jobs::router())
}
