//! Progress gateway: live streams and pull queries over the job log.
//!
//! Both modes read the same per-job log, so a client that misses the stream
//! learns the same outcome from [`ProgressGateway::status`].

mod status;
mod stream;

pub use status::StatusReport;
pub use stream::{EventStream, StreamItem};

use crate::config::GatewayConfig;
use crate::core::ProgressEvent;
use crate::errors::RegistryError;
use crate::jobs::{JobId, JobRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Read-side access to job progress.
#[derive(Debug, Clone)]
pub struct ProgressGateway {
    registry: Arc<JobRegistry>,
    heartbeat: Duration,
    latest_events: usize,
}

impl ProgressGateway {
    /// Creates a gateway with default settings.
    #[must_use]
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self::from_config(registry, &GatewayConfig::default())
    }

    /// Creates a gateway from configuration.
    #[must_use]
    pub fn from_config(registry: Arc<JobRegistry>, config: &GatewayConfig) -> Self {
        Self {
            registry,
            heartbeat: config.heartbeat_interval(),
            latest_events: config.latest_events,
        }
    }

    /// Sets the heartbeat interval of live streams.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(Duration::from_millis(1));
        self
    }

    /// Sets how many recent events a status report carries.
    #[must_use]
    pub fn with_latest_events(mut self, latest_events: usize) -> Self {
        self.latest_events = latest_events;
        self
    }

    /// Opens a live stream: history first, then live events and heartbeats,
    /// ending after the terminal event.
    ///
    /// Must be polled within a Tokio runtime.
    pub fn subscribe(&self, job_id: JobId) -> Result<EventStream, RegistryError> {
        let job = self.registry.get(job_id)?;
        Ok(stream::event_stream(job, self.heartbeat))
    }

    /// A consistent point-in-time status report.
    pub fn status(&self, job_id: JobId) -> Result<StatusReport, RegistryError> {
        let job = self.registry.get(job_id)?;
        Ok(StatusReport::from_snapshot(job.snapshot(), self.latest_events))
    }

    /// Events with `seq > after`, in order.
    pub fn events_since(&self, job_id: JobId, after: u64) -> Result<Vec<ProgressEvent>, RegistryError> {
        Ok(self.registry.get(job_id)?.events_since(after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{JobRequest, Plan};
    use crate::core::{EventDraft, JobStatus};
    use crate::events::EventBus;
    use crate::jobs::JobOutcome;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    fn gateway(capacity: usize) -> (ProgressGateway, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new(Arc::new(EventBus::new(capacity))));
        (ProgressGateway::new(Arc::clone(&registry)), registry)
    }

    fn events_only(items: Vec<StreamItem>) -> Vec<ProgressEvent> {
        items
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Event(event) => Some(event),
                StreamItem::Heartbeat => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (gateway, _) = gateway(16);
        let missing = Uuid::new_v4();
        assert!(matches!(gateway.status(missing), Err(RegistryError::NotFound { .. })));
        assert!(gateway.subscribe(missing).is_err());
        assert!(gateway.events_since(missing, 0).is_err());
    }

    #[tokio::test]
    async fn test_stream_replays_history_then_live() {
        let (gateway, registry) = gateway(16);
        let job = registry.create(JobRequest::new("Rust"));
        job.publish(EventDraft::started("router"));

        let stream = gateway.subscribe(job.id()).unwrap();
        let producer = Arc::clone(&job);
        let handle = tokio::spawn(async move {
            producer.publish(EventDraft::completed("router"));
            producer.finalize(JobOutcome::Cancelled("test".to_string()));
        });

        let events = events_only(stream.collect().await);
        handle.await.unwrap();

        assert_eq!(events, job.snapshot().events);
        assert!(events.last().unwrap().terminal);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_back_filled() {
        let (gateway, registry) = gateway(2);
        let job = registry.create(JobRequest::new("Rust"));
        let stream = gateway.subscribe(job.id()).unwrap();

        for i in 0..20 {
            job.publish(EventDraft::working("router", format!("step {i}")));
        }
        job.finalize(JobOutcome::Cancelled("done".to_string()));

        let events = events_only(stream.collect().await);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=21).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_stream_of_terminal_job_ends() {
        let (gateway, registry) = gateway(16);
        let job = registry.create(JobRequest::new("Rust"));
        job.finalize(JobOutcome::Cancelled("early".to_string()));

        let events = events_only(gateway.subscribe(job.id()).unwrap().collect().await);
        assert_eq!(events.len(), 1);
        assert!(events[0].terminal);
    }

    #[tokio::test]
    async fn test_heartbeat_on_idle_stream() {
        let (gateway, registry) = gateway(16);
        let gateway = gateway.with_heartbeat(Duration::from_millis(10));
        let job = registry.create(JobRequest::new("Rust"));

        let mut stream = gateway.subscribe(job.id()).unwrap();
        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert_eq!(item, Some(StreamItem::Heartbeat));
    }

    #[tokio::test]
    async fn test_status_and_paging() {
        let (gateway, registry) = gateway(16);
        let gateway = gateway.with_latest_events(2);
        let job = registry.create(JobRequest::new("Rust"));
        job.mark_running();
        job.init_progress(["router", "planner"]);
        job.publish(EventDraft::started("router"));
        job.publish(EventDraft::completed("router"));
        job.publish(EventDraft::started("planner"));
        job.await_approval(
            "planner",
            Plan::from_value(json!({"tasks": [{"title": "a"}]})).unwrap(),
        )
        .unwrap();

        let report = gateway.status(job.id()).unwrap();
        assert_eq!(report.status, JobStatus::AwaitingApproval);
        assert_eq!(report.event_count, 4);
        assert_eq!(report.latest_events.len(), 2);
        assert_eq!(report.latest_events[1].seq, 4);
        assert_eq!(report.percent_complete, 50);
        assert!(report.plan.is_some());
        assert!(report.bundle.is_none());

        let page = gateway.events_since(job.id(), 2).unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);

        job.cancel("stop").unwrap();
        let report = gateway.status(job.id()).unwrap();
        assert_eq!(report.status, JobStatus::Cancelled);
        assert!(report.plan.is_none());
        assert_eq!(report.error.unwrap().kind, "cancelled");
    }

    #[test]
    fn test_stream_item_wire_format() {
        let heartbeat = serde_json::to_value(StreamItem::Heartbeat).unwrap();
        assert_eq!(heartbeat, json!({"type": "heartbeat"}));
    }
}
