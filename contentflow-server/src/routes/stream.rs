//! Live progress over WebSocket.

use crate::{ApiError, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use contentflow::gateway::EventStream;
use contentflow::jobs::JobId;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/jobs/{job_id}", get(job_stream))
}

/// Upgrades to a WebSocket carrying the job's stream as JSON text frames.
///
/// The subscription is opened before the upgrade so an unknown job answers
/// 404 instead of an empty socket.
async fn job_stream(
    ws: WebSocketUpgrade,
    Path(job_id): Path<JobId>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let stream = state.gateway.subscribe(job_id)?;
    info!(job_id = %job_id, "Progress stream connected");
    Ok(ws.on_upgrade(move |socket| forward(socket, stream, job_id)))
}

async fn forward(socket: WebSocket, mut stream: EventStream, job_id: JobId) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(job_id = %job_id, "Client closed progress stream");
                    return;
                }
                Some(Err(e)) => {
                    warn!(job_id = %job_id, error = %e, "Progress stream receive error");
                    return;
                }
                Some(Ok(_)) => {}
            },
            item = stream.next() => {
                let Some(item) = item else { break };
                let text = match serde_json::to_string(&item) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Failed to encode stream item");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    debug!(job_id = %job_id, "Progress stream client went away");
                    return;
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    info!(job_id = %job_id, "Progress stream finished");
}
