//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use contentflow::errors::{RegistryError, SubmitError};
use serde_json::json;
use thiserror::Error;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A job control operation was rejected.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A submission was rejected.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// The request conflicts with the job's current state.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Registry(err) => match err {
                RegistryError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
                RegistryError::NotAwaitingApproval { .. } => {
                    (StatusCode::CONFLICT, "NotAwaitingApproval")
                }
                RegistryError::AlreadyTerminal { .. } => (StatusCode::CONFLICT, "AlreadyTerminal"),
                RegistryError::NotTerminal { .. } => (StatusCode::CONFLICT, "NotTerminal"),
                RegistryError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "InvalidPlan"),
            },
            Self::Submit(SubmitError::InvalidTopic(_)) => (StatusCode::BAD_REQUEST, "InvalidTopic"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = self.status_and_type();
        if status_code.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, error_type, "Request rejected");
        }
        let body = json!({
            "error": error_type,
            "message": self.to_string(),
        });
        (status_code, Json(body)).into_response()
    }
}
