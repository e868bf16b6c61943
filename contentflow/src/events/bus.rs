//! Per-job publish/subscribe channels.

use super::{EventSink, LoggingEventSink};
use crate::core::ProgressEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default per-job channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Intra-process event bus keyed by job id.
///
/// Each job gets its own broadcast channel. Publishing never blocks: a slow
/// subscriber lags and is expected to back-fill from the job log. Every
/// published event is also mirrored to the configured [`EventSink`].
pub struct EventBus {
    channels: DashMap<Uuid, broadcast::Sender<ProgressEvent>>,
    capacity: usize,
    sink: Arc<dyn EventSink>,
}

impl EventBus {
    /// Creates a bus with the given per-job channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            sink: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Replaces the mirror sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Opens the channel for a job. Opening twice is a no-op.
    pub fn open(&self, job_id: Uuid) {
        self.channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Subscribes to a job's live events.
    ///
    /// Returns `None` once the channel is closed; the job log then holds the
    /// full history.
    #[must_use]
    pub fn subscribe(&self, job_id: Uuid) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.channels.get(&job_id).map(|tx| tx.subscribe())
    }

    /// Publishes an event, returning the number of live receivers.
    pub fn publish(&self, event: &ProgressEvent) -> usize {
        self.sink.emit(event);
        self.channels
            .get(&event.job_id)
            .and_then(|tx| tx.send(event.clone()).ok())
            .unwrap_or(0)
    }

    /// Closes a job's channel. Receivers drain buffered events, then see
    /// `Closed`.
    pub fn close(&self, job_id: Uuid) {
        self.channels.remove(&job_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
