//! Live event stream with history replay and heartbeats.

use crate::core::ProgressEvent;
use crate::jobs::JobHandle;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// One item of a live stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem {
    /// A progress event.
    Event(ProgressEvent),
    /// Keep-alive; carries no content.
    Heartbeat,
}

/// A boxed stream of [`StreamItem`]s.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

struct StreamState {
    job: Arc<JobHandle>,
    pending: VecDeque<ProgressEvent>,
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
    last_seq: u64,
    heartbeat: Interval,
    done: bool,
}

enum Wake {
    Received(Result<ProgressEvent, RecvError>),
    Heartbeat,
}

/// Builds the stream for a job: history first, then live events, deduplicated
/// by sequence number, ending after the terminal event.
pub(super) fn event_stream(job: Arc<JobHandle>, heartbeat: Duration) -> EventStream {
    let (history, receiver) = job.subscribe();
    let mut interval = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        job,
        pending: history.into(),
        receiver,
        last_seq: 0,
        heartbeat: interval,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                if event.seq <= state.last_seq {
                    continue;
                }
                state.last_seq = event.seq;
                state.done = event.terminal;
                return Some((StreamItem::Event(event), state));
            }

            let Some(receiver) = state.receiver.as_mut() else {
                // Channel closed: whatever remains is in the log.
                let rest = state.job.events_since(state.last_seq);
                if rest.is_empty() {
                    return None;
                }
                state.pending.extend(rest);
                continue;
            };

            let wake = tokio::select! {
                biased;
                received = receiver.recv() => Wake::Received(received),
                _ = state.heartbeat.tick() => Wake::Heartbeat,
            };

            match wake {
                Wake::Received(Ok(event)) => state.pending.push_back(event),
                Wake::Received(Err(RecvError::Lagged(skipped))) => {
                    warn!(job_id = %state.job.id(), skipped, "Stream lagged; back-filling from log");
                    let missed = state.job.events_since(state.last_seq);
                    state.pending.extend(missed);
                }
                Wake::Received(Err(RecvError::Closed)) => {
                    debug!(job_id = %state.job.id(), "Event channel closed");
                    state.receiver = None;
                }
                Wake::Heartbeat => return Some((StreamItem::Heartbeat, state)),
            }
        }
    }))
}
