//! End-to-end batch behaviour against a scripted engine.

mod helpers;

use std::time::Duration;

use dcm2stl_converter::{BatchEvent, ConversionError, ErrorKind};
use dcm2stl_core::config::BatchConfig;
use dcm2stl_core::traits::engine::EngineOption;
use helpers::{Call, FakeEngine, FakeProbe, Script, Visibility, batch_config, driver, requests};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn scenario_a_immediate_success() {
    let engine = FakeEngine::new(Script {
        finish_after: Some(2),
        ..Default::default()
    });
    let probe = FakeProbe::new(Visibility::Immediately);
    let report = driver(batch_config(), probe.clone())
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status_code, Some(0));
    assert_eq!(outcome.error_kind, None);
    assert!(outcome.output_confirmed);
    assert!(!outcome.retried);
    assert_eq!(outcome.polls, 2);
    assert_eq!(outcome.verify_checks, 1);
    assert!(outcome.is_success());
    assert_eq!(probe.checks(), 1);
    assert_eq!(engine.executes(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_detach_then_success_on_retry() {
    let engine = FakeEngine::with_codes([7, 0]);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status_code, Some(0));
    assert_eq!(outcome.error_kind, None);
    assert!(outcome.retried);
    assert!(outcome.output_confirmed);
    assert_eq!(engine.executes(), 2);
    assert_eq!(engine.attaches(), 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_completion_never_signalled() {
    let engine = FakeEngine::new(Script {
        finish_after: None,
        ..Default::default()
    });
    let probe = FakeProbe::new(Visibility::Immediately);
    let start = Instant::now();
    let report = driver(batch_config(), probe.clone())
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.error_kind, Some(ErrorKind::PollTimeout));
    assert!(!outcome.output_confirmed);
    assert_eq!(outcome.polls, 1201);
    assert_eq!(outcome.verify_checks, 0);
    assert_eq!(probe.checks(), 0);
    assert!(start.elapsed() <= Duration::from_millis(30_025));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_output_never_appears() {
    let engine = FakeEngine::with_codes([0]);
    let probe = FakeProbe::new(Visibility::Never);
    let report = driver(batch_config(), probe.clone())
        .run(engine, requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status_code, Some(0));
    assert_eq!(outcome.error_kind, Some(ErrorKind::OutputNotObserved));
    assert!(!outcome.output_confirmed);
    assert_eq!(outcome.verify_checks, 6);
    assert_eq!(probe.checks(), 6);
    assert_eq!(outcome.label(), "not observed");
    assert_eq!(report.summary.not_observed, 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_invalid_input_skips_poll_and_verify() {
    let engine = FakeEngine::with_codes([2]);
    let probe = FakeProbe::new(Visibility::Immediately);
    let report = driver(batch_config(), probe.clone())
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status_code, Some(2));
    assert_eq!(outcome.error_kind, Some(ErrorKind::InvalidInputFile));
    assert!(!outcome.retried);
    assert_eq!(outcome.polls, 0);
    assert_eq!(engine.finished_reads(), 0);
    assert_eq!(probe.checks(), 0);
    assert_eq!(engine.executes(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_output_is_absorbed_by_rechecks() {
    let engine = FakeEngine::with_codes([0]);
    let report = driver(batch_config(), FakeProbe::new(Visibility::AfterChecks(3)))
        .run(engine, requests(1), CancellationToken::new())
        .await
        .expect("batch");
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.outcomes[0].verify_checks, 3);
}

#[tokio::test(start_paused = true)]
async fn failure_codes_never_poll_or_verify() {
    for code in [1, 3, 4, 5, 6, 99, 42, -1] {
        let engine = FakeEngine::with_codes([code]);
        let probe = FakeProbe::new(Visibility::Immediately);
        let report = driver(batch_config(), probe.clone())
            .run(engine.clone(), requests(1), CancellationToken::new())
            .await
            .expect("batch");

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status_code, Some(code));
        assert!(outcome.error_kind.is_some(), "code {code}");
        assert!(!outcome.retried);
        assert_eq!(engine.finished_reads(), 0, "code {code}");
        assert_eq!(probe.checks(), 0, "code {code}");
        assert_eq!(engine.executes(), 1, "code {code}");
    }
}

#[tokio::test(start_paused = true)]
async fn undocumented_code_is_recorded_verbatim() {
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(FakeEngine::with_codes([42]), requests(1), CancellationToken::new())
        .await
        .expect("batch");
    assert_eq!(
        report.outcomes[0].error_kind,
        Some(ErrorKind::Undocumented(42))
    );
}

#[tokio::test(start_paused = true)]
async fn second_detach_is_terminal_without_third_attempt() {
    let engine = FakeEngine::with_codes([7, 7, 0]);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(2), CancellationToken::new())
        .await
        .expect("batch");

    let first = &report.outcomes[0];
    assert_eq!(first.status_code, Some(7));
    assert_eq!(first.error_kind, Some(ErrorKind::SessionDetached));
    assert!(first.retried);
    assert_eq!(first.polls, 0);

    // The next request reattaches first and then succeeds.
    let second = &report.outcomes[1];
    assert!(second.is_success());
    assert!(!second.retried);

    assert_eq!(engine.executes(), 3);
    assert_eq!(engine.attaches(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_after_transient_error_code_is_not_attempted() {
    let engine = FakeEngine::with_codes([4, 0]);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");
    assert_eq!(report.outcomes[0].error_kind, Some(ErrorKind::ConversionFailed));
    assert_eq!(engine.executes(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_reattach_ends_only_that_request() {
    let engine = FakeEngine::new(Script {
        attaches: [true, false, true].into(),
        codes: [7, 0].into(),
        finish_after: Some(1),
        ..Default::default()
    });
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(2), CancellationToken::new())
        .await
        .expect("batch");

    let first = &report.outcomes[0];
    assert_eq!(first.status_code, Some(7));
    assert_eq!(first.error_kind, Some(ErrorKind::SessionDetached));
    assert!(!first.retried);
    assert!(
        first
            .note
            .as_deref()
            .is_some_and(|n| n.contains("reattach failed"))
    );

    assert!(report.outcomes[1].is_success());
    assert_eq!(engine.executes(), 2);
    assert_eq!(engine.attaches(), 3);
}

#[tokio::test(start_paused = true)]
async fn request_without_session_is_recorded_without_execute() {
    let engine = FakeEngine::new(Script {
        attaches: [true, false, false].into(),
        codes: [7].into(),
        finish_after: Some(1),
        ..Default::default()
    });
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(2), CancellationToken::new())
        .await
        .expect("batch");

    let second = &report.outcomes[1];
    assert_eq!(second.status_code, None);
    assert_eq!(second.error_kind, Some(ErrorKind::SessionDetached));
    assert!(!second.retried);
    assert_eq!(engine.executes(), 1);
    assert_eq!(report.outcomes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn batch_of_n_yields_n_outcomes_in_order() {
    let codes = [0, 2, 7, 0, 99, 0, 5, 0, 0, 6, 0, 1];
    let engine = FakeEngine::with_codes(codes);
    let input = requests(10);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), input.clone(), CancellationToken::new())
        .await
        .expect("batch");

    assert_eq!(report.outcomes.len(), 10);
    for (i, (outcome, request)) in report.outcomes.iter().zip(&input).enumerate() {
        assert_eq!(outcome.sequence, i);
        assert_eq!(&outcome.request, request);
    }
    let sent: Vec<_> = engine.input_files();
    assert_eq!(sent.len(), engine.executes());
    assert_eq!(report.summary.total, 10);
    assert_eq!(
        report.summary.converted + report.summary.not_observed + report.summary.failed,
        10
    );
}

#[tokio::test(start_paused = true)]
async fn empty_batch_still_attaches_and_detaches() {
    let engine = FakeEngine::default();
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), Vec::new(), CancellationToken::new())
        .await
        .expect("batch");
    assert!(report.outcomes.is_empty());
    assert_eq!(engine.attaches(), 1);
    assert_eq!(engine.detaches(), 1);
}

#[tokio::test(start_paused = true)]
async fn formats_are_applied_on_every_attach() {
    let engine = FakeEngine::with_codes([7, 0]);
    driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let format_sets = engine.count(&Call::SetOption(EngineOption::InputFormat, "3Shape".into()));
    let output_sets = engine.count(&Call::SetOption(EngineOption::OutputFormat, "STL".into()));
    assert_eq!(format_sets, 2);
    assert_eq!(output_sets, 2);
}

#[tokio::test(start_paused = true)]
async fn engine_unavailable_aborts_batch() {
    let engine = FakeEngine::new(Script {
        attaches: [false].into(),
        ..Default::default()
    });
    let err = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(3), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConversionError::EngineUnavailable { .. }));
    assert_eq!(engine.executes(), 0);
    assert_eq!(engine.detaches(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_issues_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let engine = FakeEngine::with_codes([]);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(4), cancel)
        .await
        .expect("batch");
    assert!(report.cancelled);
    assert_eq!(report.skipped, 4);
    assert!(report.outcomes.is_empty());
    assert_eq!(engine.executes(), 0);
    assert_eq!(engine.detaches(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_current_request_finish() {
    let cancel = CancellationToken::new();
    let engine = FakeEngine::new(Script {
        finish_after: Some(3),
        cancel_on_execute: Some((2, cancel.clone())),
        ..Default::default()
    });
    let probe = FakeProbe::new(Visibility::AfterChecks(2));
    let report = driver(batch_config(), probe.clone())
        .run(engine.clone(), requests(5), cancel)
        .await
        .expect("batch");

    assert_eq!(report.outcomes.len(), 2);
    let in_flight = &report.outcomes[1];
    assert!(in_flight.is_success());
    assert_eq!(in_flight.polls, 3);
    assert_eq!(in_flight.verify_checks, 2);
    assert!(report.cancelled);
    assert_eq!(report.skipped, 3);
    assert_eq!(engine.executes(), 2);
    assert_eq!(engine.detaches(), 1);
}

#[tokio::test(start_paused = true)]
async fn panic_in_batch_still_detaches() {
    let engine = FakeEngine::new(Script {
        panic_on_execute: Some(2),
        finish_after: Some(1),
        ..Default::default()
    });
    let d = driver(batch_config(), FakeProbe::new(Visibility::Immediately));
    let handle = engine.clone();
    let result = tokio::spawn(async move {
        d.run(handle, requests(3), CancellationToken::new()).await
    })
    .await;

    assert!(result.unwrap_err().is_panic());
    assert_eq!(engine.detaches(), 1);
    assert_eq!(engine.calls().last(), Some(&Call::Detach));
}

#[tokio::test(start_paused = true)]
async fn health_probe_reattaches_when_format_drifts() {
    let engine = FakeEngine::new(Script {
        reported_format: Some("Unknown".to_string()),
        finish_after: Some(1),
        ..Default::default()
    });
    let config = BatchConfig {
        health_probe: true,
        ..batch_config()
    };
    let report = driver(config, FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(3), CancellationToken::new())
        .await
        .expect("batch");

    assert_eq!(report.summary.converted, 3);
    assert_eq!(engine.attaches(), 4);
}

#[tokio::test(start_paused = true)]
async fn events_follow_batch_progress() {
    let (tx, mut rx) = mpsc::channel(64);
    let engine = FakeEngine::with_codes([7, 0, 2]);
    driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .with_events(tx)
        .run(engine, requests(2), CancellationToken::new())
        .await
        .expect("batch");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(BatchEvent::BatchStarted { total: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(BatchEvent::BatchFinished { cancelled: false, .. })
    ));
    let reattached = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::Reattached { succeeded: true, .. }))
        .count();
    assert_eq!(reattached, 1);
    let finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::RequestFinished { outcome } => Some(outcome.sequence),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn metrics_track_outcomes() {
    let d = driver(batch_config(), FakeProbe::new(Visibility::Immediately));
    d.run(
        FakeEngine::with_codes([0, 7, 0, 3]),
        requests(3),
        CancellationToken::new(),
    )
    .await
    .expect("batch");

    let snap = d.metrics().snapshot();
    assert_eq!(snap.requests_started, 3);
    assert_eq!(snap.converted, 2);
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.retried, 1);
    assert_eq!(snap.reattaches, 1);
}

#[tokio::test(start_paused = true)]
async fn parallel_sessions_split_work_and_keep_order() {
    let engines: Vec<_> = (0..3).map(|_| FakeEngine::with_codes([])).collect();
    let input = requests(10);
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run_parallel(engines.clone(), input.clone(), CancellationToken::new())
        .await
        .expect("batch");

    assert_eq!(report.sessions, 3);
    assert_eq!(report.outcomes.len(), 10);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.sequence, i);
        assert_eq!(outcome.request, input[i]);
    }

    let per_engine: Vec<_> = engines.iter().map(|e| e.executes()).collect();
    assert_eq!(per_engine, vec![4, 3, 3]);
    for engine in &engines {
        assert_eq!(engine.attaches(), 1);
        assert_eq!(engine.detaches(), 1);
    }

    // Each session sees a contiguous run of the submitted requests.
    let first_shard = engines[0].input_files();
    let expected: Vec<_> = input[..4]
        .iter()
        .map(|r| r.input().to_string_lossy().into_owned())
        .collect();
    assert_eq!(first_shard, expected);
}

#[tokio::test(start_paused = true)]
async fn parallel_attach_failure_releases_opened_sessions() {
    let healthy = FakeEngine::with_codes([]);
    let broken = FakeEngine::new(Script {
        attaches: [false].into(),
        ..Default::default()
    });
    let err = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run_parallel(
            vec![healthy.clone(), broken.clone()],
            requests(4),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConversionError::EngineUnavailable { .. }));
    assert_eq!(healthy.detaches(), 1);
    assert_eq!(healthy.executes(), 0);
    assert_eq!(broken.executes(), 0);
}

#[tokio::test(start_paused = true)]
async fn parallel_with_more_engines_than_requests() {
    let engines: Vec<_> = (0..4).map(|_| FakeEngine::with_codes([])).collect();
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run_parallel(engines.clone(), requests(2), CancellationToken::new())
        .await
        .expect("batch");

    assert_eq!(report.sessions, 2);
    assert_eq!(report.summary.converted, 2);
    assert_eq!(engines[2].attaches(), 0);
    assert_eq!(engines[3].attaches(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_records_no_engine_code() {
    let engine = FakeEngine::new(Script {
        broken_executes: vec![1, 2],
        finish_after: Some(1),
        ..Default::default()
    });
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.error_kind, Some(ErrorKind::SessionDetached));
    assert_eq!(outcome.status_code, None);
    assert!(outcome.retried);
    assert!(outcome.note.as_deref().is_some_and(|n| n.contains("pipe closed")));
    assert_eq!(engine.executes(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_then_real_code_keeps_real_code() {
    let engine = FakeEngine::new(Script {
        broken_executes: vec![1],
        finish_after: Some(1),
        ..Default::default()
    });
    let report = driver(batch_config(), FakeProbe::new(Visibility::Immediately))
        .run(engine.clone(), requests(1), CancellationToken::new())
        .await
        .expect("batch");

    let outcome = &report.outcomes[0];
    assert!(outcome.is_success());
    assert_eq!(outcome.status_code, Some(0));
    assert!(outcome.retried);
}

#[tokio::test(start_paused = true)]
async fn parallel_panic_lets_other_sessions_finish_and_detach() {
    let healthy = FakeEngine::new(Script {
        finish_after: Some(3),
        ..Default::default()
    });
    let crashing = FakeEngine::new(Script {
        panic_on_execute: Some(1),
        finish_after: Some(1),
        ..Default::default()
    });
    let d = driver(batch_config(), FakeProbe::new(Visibility::Immediately));
    let engines = vec![healthy.clone(), crashing.clone()];
    let result = tokio::spawn(async move {
        d.run_parallel(engines, requests(4), CancellationToken::new())
            .await
    })
    .await;

    assert!(result.unwrap_err().is_panic());
    assert_eq!(healthy.executes(), 2);
    assert_eq!(healthy.detaches(), 1);
    assert_eq!(crashing.detaches(), 1);
}
