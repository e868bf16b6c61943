//! HTTP and WebSocket surface for the contentflow engine.
//!
//! The router is built from an explicit [`AppState`]; nothing is global, so
//! tests construct their own engine and drive the routes with `oneshot`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, rust_2018_idioms)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod error;
pub mod routes;

use axum::Router;
use contentflow::gateway::ProgressGateway;
use contentflow::jobs::JobRegistry;
use contentflow::pipeline::Orchestrator;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Submits and runs jobs.
    pub orchestrator: Orchestrator,
    /// Job lookup and control.
    pub registry: Arc<JobRegistry>,
    /// Status and streaming.
    pub gateway: ProgressGateway,
}

impl AppState {
    /// Wires state around the orchestrator's registry.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, gateway: ProgressGateway) -> Self {
        Self {
            registry: Arc::clone(orchestrator.registry()),
            orchestrator,
            gateway,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState, cors_allow_any: bool) -> Router {
    let app = Router::new()
        .nest("/api", routes::api_router())
        .merge(routes::stream::router())
        .with_state(state);
    if cors_allow_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
