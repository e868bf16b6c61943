//! Job submission, control and pull queries.

use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use contentflow::context::JobRequest;
use contentflow::core::{ArtifactBundle, JobStatus, ProgressEvent};
use contentflow::gateway::StatusReport;
use contentflow::jobs::{JobId, ResumeDecision};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Response to a submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// The new job's id.
    pub job_id: JobId,
    /// Status at submission time.
    pub status: JobStatus,
}

/// Query parameters of the event page.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Return events with `seq` greater than this.
    #[serde(default)]
    pub after: u64,
}

/// A page of events.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsPage {
    /// The job id.
    pub job_id: JobId,
    /// Events after the requested sequence number.
    pub events: Vec<ProgressEvent>,
    /// Sequence number to pass as `after` for the next page.
    pub last_seq: u64,
}

/// Optional body of a resume request.
#[derive(Debug, Default, Deserialize)]
pub struct ResumeRequest {
    /// An edited plan replacing the planner's.
    #[serde(default)]
    pub plan: Option<serde_json::Value>,
}

/// Response to a control operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// The job id.
    pub job_id: JobId,
    /// Status after the operation.
    pub status: JobStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(submit))
        .route("/status/{job_id}", get(status))
        .route("/jobs/{job_id}/events", get(events))
        .route("/jobs/{job_id}/resume", post(resume))
        .route("/jobs/{job_id}/cancel", post(cancel))
        .route("/jobs/{job_id}/bundle", get(bundle))
        .route("/jobs/{job_id}", delete(remove))
}

async fn submit(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let job_id = state.orchestrator.submit(request)?;
    info!(job_id = %job_id, "Accepted generation request");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Pending,
        }),
    ))
}

async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.gateway.status(job_id)?))
}

async fn events(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsPage>, ApiError> {
    let events = state.gateway.events_since(job_id, query.after)?;
    let last_seq = events.last().map_or(query.after, |e| e.seq);
    Ok(Json(EventsPage {
        job_id,
        events,
        last_seq,
    }))
}

async fn resume(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    body: Option<Json<ResumeRequest>>,
) -> Result<Json<ControlResponse>, ApiError> {
    let decision = match body.and_then(|Json(req)| req.plan) {
        Some(plan) => ResumeDecision::ApproveWithEdits(plan),
        None => ResumeDecision::Approve,
    };
    state.registry.resume(job_id, decision)?;
    let status = state.registry.get(job_id)?.status();
    Ok(Json(ControlResponse { job_id, status }))
}

async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<ControlResponse>, ApiError> {
    state.registry.cancel(job_id)?;
    let status = state.registry.get(job_id)?.status();
    Ok(Json(ControlResponse { job_id, status }))
}

async fn bundle(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<ArtifactBundle>, ApiError> {
    let snapshot = state.registry.get(job_id)?.snapshot();
    match snapshot.bundle {
        Some(bundle) if snapshot.status == JobStatus::Completed => Ok(Json(bundle)),
        _ => Err(ApiError::Conflict(format!(
            "Job {job_id} has no bundle (status: {})",
            snapshot.status
        ))),
    }
}

async fn remove(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(job_id)?;
    Ok(StatusCode::NO_CONTENT)
}
