//! Integration tests for job execution.

#[cfg(test)]
mod tests {
    use crate::config::StagesConfig;
    use crate::context::JobRequest;
    use crate::core::{EventStatus, JobStatus, StageOutput, PIPELINE_STAGE};
    use crate::errors::{RegistryError, StageError, SubmitError};
    use crate::gateway::StreamItem;
    use crate::jobs::{JobId, ResumeDecision, StageProgress};
    use crate::pipeline::content_graph;
    use crate::stages::content::{
        ContentStages, AUDIO_SYNTHESIZER, IMAGE_GENERATOR, IMAGE_PLANNER, PLANNER,
    };
    use crate::stages::{MockSpeechSynthesizer, Stage, SynthesizedAudio};
    use crate::testing::{
        assert_event_log, statuses_of, MockStage, ReverseStage, TestGraph, TestHarness,
    };
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn synthesizer(available: bool) -> MockSpeechSynthesizer {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_is_available().return_const(available);
        synth.expect_synthesize().returning(|_| {
            Ok(SynthesizedAudio {
                bytes: vec![0x52, 0x49, 0x46, 0x46],
                format: "wav".to_string(),
            })
        });
        synth
    }

    fn content_harness(synth: MockSpeechSynthesizer) -> TestHarness {
        let stages = ContentStages::offline(&StagesConfig::default(), Arc::new(synth));
        TestHarness::new(content_graph(stages).unwrap())
    }

    fn awaiting_approval_events(harness: &TestHarness, job_id: JobId) -> usize {
        harness
            .registry
            .get(job_id)
            .unwrap()
            .snapshot()
            .events
            .iter()
            .filter(|e| e.metrics.get("awaiting_approval") == Some(&json!(true)))
            .count()
    }

    async fn wait_for_progress(harness: &TestHarness, job_id: JobId, stage: &str, progress: StageProgress) {
        let job = harness.registry.get(job_id).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while job.snapshot().progress.get(stage) != Some(&progress) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_without_images() {
        let harness = content_harness(synthesizer(true));
        let request = JobRequest::new("Quantum Computing").with_images(false);

        let job_id = harness.orchestrator.submit(request).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.completed_at.is_some());
        assert_eq!(awaiting_approval_events(&harness, job_id), 0);
        assert!(!snapshot.progress.contains_key(IMAGE_PLANNER));
        assert!(!snapshot.progress.contains_key(IMAGE_GENERATOR));
        assert!(snapshot
            .progress
            .values()
            .all(|p| *p == StageProgress::Completed));

        let bundle = snapshot.bundle.unwrap();
        assert_eq!(bundle.topic, "Quantum Computing");
        assert!(bundle.summary.word_count > 0);
        assert!(bundle.summary.social_assets >= 1);
        assert!(bundle.summary.fact_check_score.is_some());
        assert!(bundle.summary.quality_score.is_some());
        assert_eq!(bundle.summary.images, 0);
        assert_eq!(bundle.artifacts_of_kind("image").count(), 0);
        assert_eq!(bundle.artifacts_of_kind("audio").count(), 1);
        assert!(bundle.skipped.is_empty());

        let article = bundle.artifacts_of_kind("article").next().unwrap();
        assert!(article.data["content"].as_str().unwrap().starts_with("# Quantum Computing"));

        let sections: Vec<_> = bundle
            .artifacts_of_kind("section")
            .map(|a| a.task_index)
            .collect();
        assert_eq!(sections, (0..4).map(Some).collect::<Vec<_>>());

        let events = snapshot.events;
        assert_event_log(&events);
        assert_eq!(events[0].stage, PIPELINE_STAGE);
        assert_eq!(events[0].status, EventStatus::Started);
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, EventStatus::Completed);
        assert_eq!(terminal.metrics["artifacts"], json!(bundle.artifacts.len()));
    }

    #[tokio::test]
    async fn test_end_to_end_with_images() {
        let harness = content_harness(synthesizer(true));
        let job_id = harness
            .orchestrator
            .submit(JobRequest::new("Renewable Energy"))
            .unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        let bundle = snapshot.bundle.unwrap();
        assert!(bundle.summary.images > 0);
        assert_eq!(snapshot.progress[IMAGE_GENERATOR], StageProgress::Completed);
    }

    #[tokio::test]
    async fn test_stream_equals_paged_pull() {
        let mut graph = TestGraph::new(3);
        graph.write = Arc::new(ReverseStage::new("write", Duration::from_millis(5))) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());
        let job_id = harness.orchestrator.submit(JobRequest::new("Streaming")).unwrap();

        let stream = harness
            .gateway
            .subscribe(job_id)
            .unwrap()
            .collect::<Vec<StreamItem>>();
        let pull = async {
            let mut pulled = Vec::new();
            let mut last_seq = 0;
            loop {
                let page = harness.gateway.events_since(job_id, last_seq).unwrap();
                if let Some(last) = page.last() {
                    assert_eq!(page[0].seq, last_seq + 1);
                    last_seq = last.seq;
                    let done = last.terminal;
                    pulled.extend(page);
                    if done {
                        return pulled;
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        let (items, pulled) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(stream, pull)
        })
        .await
        .expect("stream or pull loop did not reach the terminal event");

        let streamed: Vec<_> = items
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Event(event) => Some(event),
                StreamItem::Heartbeat => None,
            })
            .collect();
        assert_eq!(streamed, pulled);
        assert_event_log(&streamed);

        let snapshot = harness.wait_terminal(job_id).await;
        assert_eq!(streamed, snapshot.events);
        let last_seq = pulled.last().unwrap().seq;
        assert!(harness.gateway.events_since(job_id, last_seq).unwrap().is_empty());

        let status = harness.gateway.status(job_id).unwrap();
        assert_eq!(status.event_count, streamed.len());
        assert_eq!(status.percent_complete, 100);
        assert_eq!(harness.sink.len(), streamed.len());
    }

    #[tokio::test]
    async fn test_reverse_completion_merges_in_index_order() {
        let reverse = Arc::new(ReverseStage::new("write", Duration::from_millis(15)));
        let mut graph = TestGraph::new(4);
        graph.write = Arc::clone(&reverse) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Ordering")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(reverse.completion_order(), vec![3, 2, 1, 0]);

        let merged = snapshot.records.iter().find(|r| r.stage == "merge").unwrap();
        assert_eq!(merged.output.get("order"), Some(&json!([0, 1, 2, 3])));

        let task_records: Vec<_> = snapshot
            .records
            .iter()
            .filter(|r| r.stage == "write")
            .map(|r| r.task_index)
            .collect();
        assert_eq!(task_records, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_fatal_task_fails_job_without_bundle() {
        let mut graph = TestGraph::new(3);
        graph.write = Arc::new(MockStage::new("write").failing_on_task(1));
        let publish = Arc::new(MockStage::new("publish"));
        graph.publish = Arc::clone(&publish) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Failure")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.bundle.is_none());
        assert_eq!(publish.call_count(), 0);
        assert!(!snapshot.records.iter().any(|r| r.stage == "write" || r.stage == "merge"));
        assert_eq!(snapshot.progress["write"], StageProgress::Failed);
        assert_eq!(snapshot.progress["merge"], StageProgress::Pending);

        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, "barrier_failure");
        assert_eq!(error.stage.as_deref(), Some("write"));
        assert!(error.message.contains("1 of 3 tasks failed"));

        let terminal = snapshot.events.last().unwrap();
        assert!(terminal.terminal);
        assert_eq!(terminal.status, EventStatus::Error);
        assert_eq!(terminal.message, error.message);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let research = Arc::new(MockStage::new("research").with_transient_failures(2));
        let mut graph = TestGraph::new(2);
        graph.research = Arc::clone(&research) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Retries")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(research.recorded_attempts(), vec![1, 2, 3]);
        assert_eq!(
            statuses_of(&snapshot.events, "research"),
            vec![
                EventStatus::Started,
                EventStatus::Working,
                EventStatus::Working,
                EventStatus::Completed
            ]
        );
        let retry = snapshot
            .events
            .iter()
            .find(|e| e.stage == "research" && e.status == EventStatus::Working)
            .unwrap();
        assert_eq!(retry.metrics["attempt"], json!(1));
        assert!(retry.metrics.contains_key("delay_ms"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_job() {
        let mut graph = TestGraph::new(2);
        graph.research = Arc::new(MockStage::new("research").with_transient_failures(10));
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Retries")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, "stage_error");
        assert_eq!(
            error.message,
            "Stage 'research' failed after 3 attempt(s): attempt 3 timed out"
        );
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let research = Arc::new(MockStage::new("research").failing(StageError::fatal("bad input")));
        let mut graph = TestGraph::new(2);
        graph.research = Arc::clone(&research) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Fatal")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(research.call_count(), 1);
        assert_eq!(snapshot.progress["plan"], StageProgress::Pending);
    }

    #[tokio::test]
    async fn test_approval_pauses_once_and_resumes() {
        let write = Arc::new(MockStage::new("write"));
        let mut graph = TestGraph::new(2);
        graph.write = Arc::clone(&write) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let request = JobRequest::new("Approval").with_auto_approve(false);
        let job_id = harness.orchestrator.submit(request).unwrap();
        harness
            .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
            .await;

        let status = harness.gateway.status(job_id).unwrap();
        assert_eq!(status.plan.unwrap().task_count(), 2);
        assert_eq!(write.call_count(), 0);
        assert_eq!(awaiting_approval_events(&harness, job_id), 1);

        harness.registry.resume(job_id, ResumeDecision::Approve).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(write.call_count(), 2);
        assert_eq!(awaiting_approval_events(&harness, job_id), 1);

        let pause = snapshot
            .events
            .iter()
            .position(|e| e.metrics.get("awaiting_approval") == Some(&json!(true)))
            .unwrap();
        assert_eq!(snapshot.events[pause].stage, "plan");
        assert_eq!(snapshot.events[pause - 1].stage, "plan");
        assert_eq!(snapshot.events[pause - 1].status, EventStatus::Completed);
        assert_eq!(snapshot.events[pause + 1].stage, PIPELINE_STAGE);
        assert_eq!(snapshot.events[pause + 1].metrics["edited"], json!(false));

        assert!(matches!(
            harness.registry.resume(job_id, ResumeDecision::Approve),
            Err(RegistryError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_resume_with_edited_plan() {
        let harness = TestHarness::new(TestGraph::new(3).build());
        let request = JobRequest::new("Edits").with_auto_approve(false);
        let job_id = harness.orchestrator.submit(request).unwrap();
        harness
            .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
            .await;

        let rejected = harness
            .registry
            .resume(job_id, ResumeDecision::ApproveWithEdits(json!({"tasks": []})));
        assert!(matches!(rejected, Err(RegistryError::InvalidPlan(_))));
        assert_eq!(
            harness.registry.get(job_id).unwrap().status(),
            JobStatus::AwaitingApproval
        );

        let edited = json!({"title": "Edited", "tasks": [{"title": "Only"}]});
        harness
            .registry
            .resume(job_id, ResumeDecision::ApproveWithEdits(edited.clone()))
            .unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.plan.unwrap().as_value(), &edited);
        let merged = snapshot.records.iter().find(|r| r.stage == "merge").unwrap();
        assert_eq!(merged.output.get("order"), Some(&json!([0])));
    }

    #[tokio::test]
    async fn test_resume_requires_awaiting_approval() {
        let mut graph = TestGraph::new(2);
        graph.research = Arc::new(MockStage::new("research").with_delay(Duration::from_millis(100)));
        let harness = TestHarness::new(graph.build());

        let request = JobRequest::new("Too early").with_auto_approve(false);
        let job_id = harness.orchestrator.submit(request).unwrap();
        wait_for_progress(&harness, job_id, "research", StageProgress::Running).await;

        assert!(matches!(
            harness.registry.resume(job_id, ResumeDecision::Approve),
            Err(RegistryError::NotAwaitingApproval { .. })
        ));
        harness.registry.cancel(job_id).unwrap();
        harness.wait_terminal(job_id).await;
    }

    #[tokio::test]
    async fn test_optional_audio_unavailable_is_skipped() {
        let harness = content_harness(synthesizer(false));
        let request = JobRequest::new("Quantum Computing").with_images(false);

        let job_id = harness.orchestrator.submit(request).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress[AUDIO_SYNTHESIZER], StageProgress::Skipped);

        let completed = snapshot
            .events
            .iter()
            .find(|e| e.stage == AUDIO_SYNTHESIZER && e.status == EventStatus::Completed)
            .unwrap();
        assert_eq!(completed.metrics["skipped"], json!(true));
        assert_eq!(completed.metrics["reason"], json!("speech synthesizer unavailable"));

        let bundle = snapshot.bundle.unwrap();
        assert_eq!(bundle.artifacts_of_kind("audio").count(), 0);
        assert_eq!(bundle.skipped.len(), 1);
        assert_eq!(bundle.skipped[0].stage, AUDIO_SYNTHESIZER);
        assert_eq!(bundle.skipped[0].reason, "speech synthesizer unavailable");
    }

    #[tokio::test]
    async fn test_optional_audio_failure_is_skipped() {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_is_available().return_const(true);
        synth
            .expect_synthesize()
            .returning(|_| Err(StageError::fatal("tts crashed")));
        let harness = content_harness(synth);

        let job_id = harness
            .orchestrator
            .submit(JobRequest::new("Quantum Computing").with_images(false))
            .unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress[AUDIO_SYNTHESIZER], StageProgress::Skipped);
        let bundle = snapshot.bundle.unwrap();
        assert_eq!(bundle.skipped[0].reason, "failed: tts crashed");
    }

    #[tokio::test]
    async fn test_audio_disabled_is_not_scheduled() {
        let harness = content_harness(synthesizer(true));
        let request = JobRequest::new("Quantum Computing")
            .with_images(false)
            .with_audio(false);

        let job_id = harness.orchestrator.submit(request).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert!(!snapshot.progress.contains_key(AUDIO_SYNTHESIZER));
        assert!(snapshot.bundle.unwrap().skipped.is_empty());
    }

    #[tokio::test]
    async fn test_required_stage_skip_is_contract_violation() {
        let mut graph = TestGraph::new(2);
        graph.publish = Arc::new(MockStage::new("publish").with_output(StageOutput::skip("nothing to do")));
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Contract")).unwrap();
        let snapshot = harness.wait_terminal(job_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, "contract_violation");
        assert_eq!(error.stage.as_deref(), Some("publish"));
    }

    #[tokio::test]
    async fn test_cancel_mid_fan_out() {
        let mut graph = TestGraph::new(3);
        graph.write = Arc::new(MockStage::new("write").with_delay(Duration::from_millis(150)));
        let publish = Arc::new(MockStage::new("publish"));
        graph.publish = Arc::clone(&publish) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let job_id = harness.orchestrator.submit(JobRequest::new("Cancel me")).unwrap();
        wait_for_progress(&harness, job_id, "write", StageProgress::Running).await;
        harness.registry.cancel(job_id).unwrap();

        let snapshot = harness.wait_terminal(job_id).await;
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert!(snapshot.bundle.is_none());
        assert_eq!(publish.call_count(), 0);
        assert!(!snapshot.records.iter().any(|r| r.stage == "write" || r.stage == "merge"));
        assert_eq!(snapshot.error.unwrap().kind, "cancelled");

        let terminal = snapshot.events.last().unwrap();
        assert_eq!(terminal.metrics["cancelled"], json!(true));
        assert_event_log(&snapshot.events);

        assert!(matches!(
            harness.registry.cancel(job_id),
            Err(RegistryError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_approval() {
        let write = Arc::new(MockStage::new("write"));
        let mut graph = TestGraph::new(2);
        graph.write = Arc::clone(&write) as Arc<dyn Stage>;
        let harness = TestHarness::new(graph.build());

        let request = JobRequest::new("Paused").with_auto_approve(false);
        let job_id = harness.orchestrator.submit(request).unwrap();
        harness
            .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
            .await;

        harness.registry.cancel(job_id).unwrap();
        let job = harness.registry.get(job_id).unwrap();
        assert_eq!(job.status(), JobStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(write.call_count(), 0);
        assert_eq!(job.snapshot().events.iter().filter(|e| e.terminal).count(), 1);
        assert!(matches!(
            harness.registry.resume(job_id, ResumeDecision::Approve),
            Err(RegistryError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_topic() {
        let harness = TestHarness::new(TestGraph::new(1).build());
        let err = harness.orchestrator.submit(JobRequest::new("!!")).unwrap_err();

        assert!(matches!(err, SubmitError::InvalidTopic(_)));
        assert!(harness.registry.is_empty());
    }

    #[tokio::test]
    async fn test_jobs_run_concurrently() {
        let harness = content_harness(synthesizer(true));
        let ids: Vec<JobId> = ["Rust Ownership", "Solar Power", "Deep Sea Life"]
            .into_iter()
            .map(|topic| {
                harness
                    .orchestrator
                    .submit(JobRequest::new(topic).with_images(false))
                    .unwrap()
            })
            .collect();

        for id in ids {
            let snapshot = harness.wait_terminal(id).await;
            assert_eq!(snapshot.status, JobStatus::Completed);
            assert_eq!(snapshot.records.iter().filter(|r| r.stage == PLANNER).count(), 1);
        }
        assert_eq!(harness.registry.active_count(), 0);
        assert_eq!(harness.registry.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_terminal_job() {
        let harness = TestHarness::new(TestGraph::new(1).build());
        let job_id = harness.orchestrator.submit(JobRequest::new("Delete me")).unwrap();
        harness.wait_terminal(job_id).await;

        harness.registry.delete(job_id).unwrap();
        assert!(matches!(
            harness.gateway.status(job_id),
            Err(RegistryError::NotFound { .. })
        ));
    }
}
