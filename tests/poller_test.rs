use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use vertex_genmedia::adapters::{Provider, RawResult};
use vertex_genmedia::error::GenMediaError;
use vertex_genmedia::logs::NodeLog;
use vertex_genmedia::operation::poller::HEARTBEAT_LINE;
use vertex_genmedia::operation::{Operation, OperationError, OperationPoller, PollOutcome};
use vertex_genmedia::utils::CancelHandle;

/// A poll function that replays `script` in order and counts calls.
fn scripted(
    script: Vec<Operation>,
    calls: Arc<AtomicU32>,
) -> impl FnMut(Operation) -> std::future::Ready<Result<Operation, GenMediaError>> {
    let script = Mutex::new(script.into_iter());
    move |_prev| {
        calls.fetch_add(1, Ordering::SeqCst);
        let next = script.lock().unwrap().next();
        std::future::ready(
            next.ok_or_else(|| GenMediaError::UnexpectedError("polled past the script".into())),
        )
    }
}

fn pending() -> Operation {
    Operation::pending("projects/p/locations/us-central1/operations/42")
}

#[tokio::test(start_paused = true)]
async fn canned_sequence_fails_after_three_heartbeats() {
    let calls = Arc::new(AtomicU32::new(0));
    let script = vec![
        pending(),
        pending(),
        pending(),
        Operation::failed("op", OperationError::new(Some(3), "prompt rejected")),
    ];
    let log = NodeLog::new();
    let poller = OperationPoller::new(Duration::from_secs(15));

    let report = poller
        .run(
            || async { Ok(pending()) },
            scripted(script, calls.clone()),
            &log,
        )
        .await
        .unwrap();

    assert_eq!(report.heartbeats, 3);
    assert_eq!(report.polls, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(log.count_containing(HEARTBEAT_LINE), 3);
    match &report.outcome {
        PollOutcome::Failed(err) => assert_eq!(err.message, "prompt rejected"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        report.into_result(),
        Err(GenMediaError::OperationFailed { code: Some(3), .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn internal_error_code_is_transient() {
    let calls = Arc::new(AtomicU32::new(0));
    let script = vec![Operation::failed(
        "op",
        OperationError::new(Some(13), "Internal error encountered."),
    )];
    let report = OperationPoller::new(Duration::from_secs(1))
        .run(
            || async { Ok(pending()) },
            scripted(script, calls),
            &NodeLog::new(),
        )
        .await
        .unwrap();
    let err = report.into_result().unwrap_err();
    assert!(matches!(
        err,
        GenMediaError::TransientProviderError { code: 13, .. }
    ));
    assert!(err.log_lines().iter().any(|l| l.contains("region")));
}

#[tokio::test(start_paused = true)]
async fn polls_are_spaced_by_the_interval() {
    let started = Instant::now();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let stamps_in = stamps.clone();
    let mut n = 0;

    let report = OperationPoller::new(Duration::from_secs(15))
        .run(
            || async { Ok(pending()) },
            move |_op| {
                stamps_in.lock().unwrap().push(started.elapsed());
                n += 1;
                let op = if n < 3 {
                    pending()
                } else {
                    Operation::succeeded(
                        "op",
                        RawResult::new(Provider::Veo, json!({"videos": [{"gcsUri": "gs://b/v.mp4"}]})),
                    )
                };
                async move { Ok(op) }
            },
            &NodeLog::new(),
        )
        .await
        .unwrap();

    assert!(report.is_done());
    assert_eq!(
        *stamps.lock().unwrap(),
        vec![
            Duration::from_secs(15),
            Duration::from_secs(30),
            Duration::from_secs(45)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn fully_filtered_result_is_terminal_with_reasons() {
    let calls = Arc::new(AtomicU32::new(0));
    let body = json!({
        "raiMediaFilteredCount": 1,
        "raiMediaFilteredReasons": ["Unable to generate videos because of celebrity likeness"],
        "videos": []
    });
    let script = vec![Operation::succeeded("op", RawResult::new(Provider::Veo, body))];
    let report = OperationPoller::new(Duration::from_secs(15))
        .run(
            || async { Ok(pending()) },
            scripted(script, calls.clone()),
            &NodeLog::new(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    match report.into_result() {
        Err(GenMediaError::ContentFilteredError {
            filtered_count,
            reasons,
        }) => {
            assert_eq!(filtered_count, 1);
            assert_eq!(
                reasons,
                vec!["Unable to generate videos because of celebrity likeness"]
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling() {
    let cancel = CancelHandle::new();
    let cancel_in_poll = cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = calls.clone();

    let err = OperationPoller::new(Duration::from_secs(15))
        .with_cancel(cancel)
        .run(
            || async { Ok(pending()) },
            move |_op| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                cancel_in_poll.cancel();
                async { Ok(pending()) }
            },
            &NodeLog::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenMediaError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_submit_never_submits() {
    let cancel = CancelHandle::new();
    cancel.cancel();
    let submitted = Arc::new(AtomicU32::new(0));
    let submitted_in = submitted.clone();

    let err = OperationPoller::new(Duration::from_secs(15))
        .with_cancel(cancel)
        .run(
            move || {
                submitted_in.fetch_add(1, Ordering::SeqCst);
                async { Ok(pending()) }
            },
            |_op| async { Ok(pending()) },
            &NodeLog::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GenMediaError::Cancelled));
    assert_eq!(submitted.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn max_attempts_bounds_polling() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = calls.clone();
    let err = OperationPoller::new(Duration::from_secs(15))
        .with_max_attempts(5)
        .run(
            || async { Ok(pending()) },
            move |_op| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async { Ok(pending()) }
            },
            &NodeLog::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GenMediaError::Timeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn poll_errors_propagate() {
    let err = OperationPoller::new(Duration::from_secs(15))
        .run(
            || async { Ok(pending()) },
            |_op| async { Err(GenMediaError::api_error(404, "operation not found")) },
            &NodeLog::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}
