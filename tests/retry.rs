//! Resilience executor behavior under scripted failures.
//!
//! All timing assertions run under the paused clock, so elapsed times are
//! exact sums of the configured delays.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{io_err, rpc_err};
use courier::{RemoteError, RetrySchedule, invoke_with_retry};

#[tokio::test(start_paused = true)]
async fn two_transient_failures_then_success() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);
    let started  = tokio::time::Instant::now();

    let result = invoke_with_retry(&schedule, &cancel, "op", || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 { Err(io_err()) } else { Ok(n) }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // Elapsed is exactly the first two schedule steps.
    assert_eq!(started.elapsed(), Duration::from_millis(200 + 500));
}

#[tokio::test(start_paused = true)]
async fn excessive_flood_wait_aborts_without_sleeping() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);
    let started  = tokio::time::Instant::now();

    let result: Result<(), _> = invoke_with_retry(&schedule, &cancel, "op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(rpc_err(420, "FLOOD_WAIT_600")) }
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.is("FLOOD_WAIT"), "the flood error must be surfaced, got {err}");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO, "must not wait at all");
}

#[tokio::test(start_paused = true)]
async fn moderate_flood_wait_overrides_schedule_entry() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);
    let started  = tokio::time::Instant::now();

    let result = invoke_with_retry(&schedule, &cancel, "op", || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 { Err(rpc_err(420, "FLOOD_WAIT_10")) } else { Ok(()) }
        }
    })
    .await;

    assert!(result.is_ok());
    // 10s is within the 16s ceiling and replaces the 200ms schedule entry.
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn permanent_error_gets_exactly_one_attempt() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = invoke_with_retry(&schedule, &cancel, "op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(rpc_err(401, "AUTH_KEY_UNREGISTERED")) }
    })
    .await;

    assert!(result.unwrap_err().is("AUTH_KEY_UNREGISTERED"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unclassified_error_gets_exactly_one_attempt() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = invoke_with_retry(&schedule, &cancel, "op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(RemoteError::Malformed("truncated frame".into())) }
    })
    .await;

    assert!(matches!(result.unwrap_err(), RemoteError::Malformed(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_surfaces_the_last_error() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    let attempts = AtomicU32::new(0);
    let started  = tokio::time::Instant::now();

    let result: Result<(), _> = invoke_with_retry(&schedule, &cancel, "op", || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 5 { Err(rpc_err(500, "INTERNAL")) } else { Err(io_err()) }
        }
    })
    .await;

    // Max attempts equals the schedule length; the final error wins.
    assert!(result.unwrap_err().is("INTERNAL"));
    assert_eq!(attempts.load(Ordering::SeqCst), 6);
    // Five sleeps happen between six attempts.
    assert_eq!(started.elapsed(), Duration::from_millis(200 + 500 + 1000 + 2000 + 4000));
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_backoff_aborts_immediately() {
    let schedule = RetrySchedule::new(vec![Duration::from_secs(30); 3]);
    let cancel   = CancellationToken::new();
    let started  = tokio::time::Instant::now();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        })
    };

    let result: Result<(), _> =
        invoke_with_retry(&schedule, &cancel, "op", || async { Err(io_err()) }).await;

    assert!(matches!(result.unwrap_err(), RemoteError::Cancelled));
    // Aborted one second in, not after the 30s backoff.
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    canceller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_means_no_attempt() {
    let schedule = RetrySchedule::default();
    let cancel   = CancellationToken::new();
    cancel.cancel();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = invoke_with_retry(&schedule, &cancel, "op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })
    .await;

    assert!(matches!(result.unwrap_err(), RemoteError::Cancelled));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}
