//! Job lifecycle integration tests.
//!
//! Drives jobs through the orchestrator against a [`ScriptedBackend`] and
//! checks the published events, snapshots and final outcomes.

mod common;

use assert_matches::assert_matches;
use bytes::Bytes;
use std::time::Duration;

use common::{
    collect_events, mib, progress_path, state_path, ExecScript, ScriptedBackend, Stage, TestHarness,
};
use vidshrink::{CompressionRatio, JobOutcome};
use vs_core::config::Config;
use vs_core::events::JobEventPayload;
use vs_core::{ErrorKind, JobState};

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_job_visits_every_state_in_order() {
    let harness = TestHarness::ready(ScriptedBackend::new()).await;
    let mut job = harness.orchestrator.submit(Bytes::from_static(b"source")).unwrap();
    assert_eq!(job.state(), JobState::Created);

    let events = collect_events(&mut job).await;
    assert_eq!(
        state_path(&events),
        vec![
            JobState::WritingInput,
            JobState::Encoding,
            JobState::ReadingOutput,
            JobState::Completed,
        ]
    );

    let first = events
        .iter()
        .find_map(|e| match e {
            JobEventPayload::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .unwrap();
    assert_eq!(first, (JobState::Created, JobState::WritingInput));
    assert!(events.iter().all(|e| e.job_id() == job.id()));
    assert_matches!(events.last(), Some(JobEventPayload::Completed { .. }));
}

#[tokio::test]
async fn five_mib_to_two_mib_scenario() {
    let backend = ScriptedBackend::with_script(ExecScript {
        ticks: vec![0.0, 0.5, 1.0],
        output: Some(mib(2)),
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let mut job = harness.orchestrator.submit(mib(5)).unwrap();
    let events = collect_events(&mut job).await;

    let progress = progress_path(&events);
    assert_eq!(progress, vec![0, 50, 100]);

    let result = match job.wait().await {
        JobOutcome::Completed(result) => result,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(result.original_size_bytes(), 5_242_880);
    assert_eq!(result.compressed_size_bytes(), 2_097_152);
    assert_matches!(result.compression_ratio(), CompressionRatio::Percent(p) if (p - 60.0).abs() < 1e-9);
    assert_eq!(result.output().len(), 2_097_152);

    let snapshot = job.snapshot();
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.progress_percent, 100);
    assert!(snapshot.failure.is_none());
    assert!(snapshot.finished_at.is_some());

    match events.last() {
        Some(JobEventPayload::Completed {
            original_size_bytes,
            compressed_size_bytes,
            compression_ratio_percent,
            ..
        }) => {
            assert_eq!(*original_size_bytes, 5_242_880);
            assert_eq!(*compressed_size_bytes, 2_097_152);
            assert!((compression_ratio_percent.unwrap() - 60.0).abs() < 1e-9);
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test]
async fn backend_receives_configured_names_and_command() {
    let harness = TestHarness::ready(ScriptedBackend::new()).await;
    let job = harness.orchestrator.submit(Bytes::from_static(b"abc")).unwrap();
    assert_matches!(job.wait().await, JobOutcome::Completed(_));

    assert_eq!(*harness.backend.writes.lock(), vec![("input.mp4".to_string(), 3)]);
    let execs = harness.backend.execs.lock();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0], harness.orchestrator.command());
    assert_eq!(execs[0].last().map(String::as_str), Some("output.mp4"));
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_never_decreases() {
    let backend = ScriptedBackend::with_script(ExecScript {
        ticks: vec![0.1, 0.35, 0.2, 0.6, 0.59, 1.4, 0.9],
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let mut job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    let progress = progress_path(&collect_events(&mut job).await);

    assert_eq!(progress, vec![10, 35, 35, 60, 60, 100, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn empty_output_with_empty_input_is_not_computable() {
    let backend = ScriptedBackend::with_script(ExecScript {
        output: Some(Bytes::new()),
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let job = harness.orchestrator.submit(Bytes::new()).unwrap();
    match job.wait().await {
        JobOutcome::Completed(result) => {
            assert_eq!(result.compression_ratio(), CompressionRatio::NotComputable);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_logs_are_published_and_retained() {
    let backend = ScriptedBackend::with_script(ExecScript {
        logs: vec!["frame=1".into(), "frame=2".into()],
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let mut job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    let events = collect_events(&mut job).await;

    let lines: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            JobEventPayload::Log { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["frame=1", "frame=2"]);
    assert_eq!(job.snapshot().log_lines, vec!["frame=1", "frame=2"]);
}

#[tokio::test]
async fn log_retention_is_capped() {
    let mut config = Config::default();
    config.jobs.max_log_lines = 2;
    let backend = ScriptedBackend::with_script(ExecScript {
        logs: (0..5).map(|i| format!("line {i}")).collect(),
        ..ExecScript::default()
    });
    let harness = TestHarness::ready_with_config(backend, config).await;

    let mut job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    let events = collect_events(&mut job).await;

    let published = events
        .iter()
        .filter(|e| matches!(e, JobEventPayload::Log { .. }))
        .count();
    assert_eq!(published, 5);

    let snapshot = job.snapshot();
    assert_eq!(snapshot.log_lines, vec!["line 3", "line 4"]);
    assert_eq!(snapshot.dropped_log_lines, 3);
}

#[tokio::test]
async fn each_job_starts_with_an_empty_log() {
    let backend = ScriptedBackend::with_script(ExecScript {
        logs: vec!["only line".into()],
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    for _ in 0..2 {
        let job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
        job.wait().await;
        assert_eq!(job.snapshot().log_lines, vec!["only line"]);
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encode_failure_carries_message_and_logs() {
    let backend = ScriptedBackend::with_script(ExecScript {
        logs: vec!["error: invalid codec".into()],
        status: 1,
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let mut job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    let events = collect_events(&mut job).await;

    assert_eq!(state_path(&events).last(), Some(&JobState::Failed));
    match events.last() {
        Some(JobEventPayload::Failed { kind, message, .. }) => {
            assert_eq!(*kind, ErrorKind::EncodeFailed);
            assert_eq!(message, "error: invalid codec");
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }

    match job.wait().await {
        JobOutcome::Failed(failure) => {
            assert_eq!(failure.kind, ErrorKind::EncodeFailed);
            assert_eq!(failure.message, "error: invalid codec");
            assert_eq!(failure.error_log_lines, vec!["error: invalid codec"]);
            assert_eq!(failure.job_log_lines, vec!["error: invalid codec"]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let snapshot = job.snapshot();
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.result.is_none());

    // The slot was released: a later submission is accepted and completes.
    harness.backend.script.lock().status = 0;
    let next = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    assert_ne!(next.id(), job.id());
    assert_matches!(next.wait().await, JobOutcome::Completed(_));
}

#[tokio::test]
async fn missing_output_fails_the_job() {
    let backend = ScriptedBackend::with_script(ExecScript {
        output: None,
        ..ExecScript::default()
    });
    let harness = TestHarness::ready(backend).await;

    let job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    match job.wait().await {
        JobOutcome::Failed(failure) => {
            assert_eq!(failure.kind, ErrorKind::OutputMissing);
            assert!(failure.message.contains("output.mp4"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!harness.orchestrator.is_busy());
}

#[tokio::test]
async fn engine_panic_fails_the_job() {
    let harness = TestHarness::ready(ScriptedBackend::new().panicking_at(Stage::Exec)).await;

    let mut job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    let events = collect_events(&mut job).await;
    assert_eq!(
        state_path(&events),
        vec![JobState::WritingInput, JobState::Encoding, JobState::Failed]
    );
    assert_matches!(
        events.last(),
        Some(JobEventPayload::Failed {
            kind: ErrorKind::Internal,
            ..
        })
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), job.wait())
        .await
        .expect("wait should return once the runner is gone");
    match outcome {
        JobOutcome::Failed(failure) => assert_eq!(failure.kind, ErrorKind::Internal),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(job.snapshot().state, JobState::Failed);
    assert!(!harness.orchestrator.is_busy());

    // The engine is free again.
    let next = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    assert_matches!(next.wait().await, JobOutcome::Failed(_));
}

#[tokio::test]
async fn current_job_tracks_latest_submission() {
    let harness = TestHarness::ready(ScriptedBackend::new()).await;
    assert!(harness.orchestrator.current_job().is_none());

    let job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    job.wait().await;

    let current = harness.orchestrator.current_job().unwrap();
    assert_eq!(current.id, job.id());
    assert_eq!(current.state, JobState::Completed);
    assert_eq!(current.input_size_bytes, 3);
}

#[tokio::test]
async fn late_observers_can_read_recent_events() {
    let harness = TestHarness::ready(ScriptedBackend::new()).await;
    let job = harness.orchestrator.submit(Bytes::from_static(b"src")).unwrap();
    job.wait().await;

    let recent = harness.bus.recent_events(1);
    assert_eq!(recent.len(), 1);
    assert_matches!(recent[0].payload, JobEventPayload::Completed { .. });
}
