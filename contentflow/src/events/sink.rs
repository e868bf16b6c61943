//! Mirrors of the event stream outside the per-job channels.

use crate::core::{EventStatus, ProgressEvent};
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receives every event the bus publishes, across all jobs.
///
/// Called while the job's log lock is held, so implementations must neither
/// block nor panic.
pub trait EventSink: Send + Sync {
    /// Observes one event.
    fn emit(&self, event: &ProgressEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Writes each event to `tracing` with `job_id`, `stage` and `seq` fields.
///
/// Error events go to `warn` whatever the configured level; with
/// [`Level::DEBUG`] the metrics are included.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingEventSink {
    /// Logs at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `debug`, with metrics.
    #[must_use]
    pub fn verbose() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &ProgressEvent) {
        match (event.status, self.level) {
            (EventStatus::Error, _) => warn!(
                job_id = %event.job_id,
                stage = %event.stage,
                seq = event.seq,
                terminal = event.terminal,
                "{}",
                event.message
            ),
            (status, Level::DEBUG | Level::TRACE) => debug!(
                job_id = %event.job_id,
                stage = %event.stage,
                %status,
                seq = event.seq,
                metrics = ?event.metrics,
                "{}",
                event.message
            ),
            (status, _) => info!(
                job_id = %event.job_id,
                stage = %event.stage,
                %status,
                seq = event.seq,
                "{}",
                event.message
            ),
        }
    }
}

/// Keeps every event in memory; for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<ProgressEvent>>,
}

impl CollectingEventSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True until the first event arrives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events of one job, in arrival order.
    #[must_use]
    pub fn events_for_job(&self, job_id: uuid::Uuid) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &ProgressEvent) {
        self.events.write().push(event.clone());
    }
}
