//! Test assertions for stage outputs and event logs.

use crate::core::{EventStatus, ProgressEvent, StageOutput, PIPELINE_STAGE};

/// Asserts that the output was produced, not skipped.
pub fn assert_output_produced(output: &StageOutput) {
    assert!(
        !output.is_skipped(),
        "Expected produced output, got skip: {:?}",
        output.skip_reason()
    );
}

/// Asserts that the output is a skip.
pub fn assert_output_skipped(output: &StageOutput) {
    assert!(output.is_skipped(), "Expected skipped output, got {output:?}");
}

/// Asserts that the output contains a specific key.
pub fn assert_output_contains(output: &StageOutput, key: &str) {
    assert!(
        output.get(key).is_some(),
        "Expected output to contain key '{}', but it doesn't. Keys: {:?}",
        key,
        output.data.keys().collect::<Vec<_>>()
    );
}

/// Asserts that an event log is well formed: contiguous sequence numbers from
/// 1 and, if terminal, exactly one terminal event, last.
pub fn assert_event_log(events: &[ProgressEvent]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1, "Sequence gap at position {i}: {event:?}");
    }
    let terminals = events.iter().filter(|e| e.terminal).count();
    assert!(terminals <= 1, "Expected at most one terminal event, got {terminals}");
    if let Some(terminal) = events.iter().find(|e| e.terminal) {
        assert_eq!(
            Some(terminal.seq),
            events.last().map(|e| e.seq),
            "Terminal event is not last"
        );
        assert_eq!(terminal.stage, PIPELINE_STAGE);
    }
}

/// Statuses of one stage's events, in log order.
#[must_use]
pub fn statuses_of(events: &[ProgressEvent], stage: &str) -> Vec<EventStatus> {
    events
        .iter()
        .filter(|e| e.stage == stage)
        .map(|e| e.status)
        .collect()
}
