use crate::lease::*;
use crate::shutdown::ShutdownHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// ---------------------------
// Helpers
// ---------------------------

fn lease() -> WriteLease {
    WriteLease::new(LeaseParams {
        lease_duration: Duration::from_secs(60),
        retry_interval: Duration::from_secs(1),
        backoff: Backoff::default().without_jitter(),
    })
}

fn counting(calls: &Arc<AtomicUsize>, outcome: WorkOutcome) -> WorkFn {
    let calls = calls.clone();
    work_fn(move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            outcome
        }
    })
}

/// Fails with retry `failures` times, then succeeds.
fn flaky(calls: &Arc<AtomicUsize>, failures: usize) -> WorkFn {
    let calls = calls.clone();
    work_fn(move || {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                WorkOutcome::failed(true)
            } else {
                WorkOutcome::succeeded()
            }
        }
    })
}

// ---------------------------
// Tests
// ---------------------------

#[tokio::test(start_paused = true)]
async fn success_makes_leader() {
    // Arrange
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    // Act
    lease.try_work("k", counting(&calls, WorkOutcome::succeeded()));
    let leader = lease.wait().await;

    // Assert
    assert!(leader);
    assert_eq!(lease.state("k"), Some(LeaseState::Leader));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!lease.is_queued("k"));
}

#[tokio::test(start_paused = true)]
async fn failure_without_retry_makes_follower() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("k", counting(&calls, WorkOutcome::failed(false)));

    assert!(!lease.wait().await);
    assert_eq!(lease.state("k"), Some(LeaseState::Follower));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn follower_work_waits_for_expiry() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("k", counting(&calls, WorkOutcome::failed(false)));
    assert!(!lease.wait().await);

    // follower expiry is the first backoff step
    let start = Instant::now();
    lease.try_work("k", counting(&calls, WorkOutcome::succeeded()));
    assert!(lease.wait().await);

    assert!(start.elapsed() >= Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_backs_off_until_success() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    lease.try_work("k", flaky(&calls, 2));
    assert!(lease.wait().await);

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 80ms after the first failure, 320ms after the second
    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn queued_work_is_replaced() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    // both land before the worker gets to run
    lease.try_work("k", counting(&first, WorkOutcome::succeeded()));
    lease.try_work("k", counting(&second, WorkOutcome::succeeded()));
    assert!(lease.wait().await);

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_try_runs_after_current_work() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));

    let slow = {
        let calls = slow_calls.clone();
        work_fn(move || {
            let calls = calls.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                calls.fetch_add(1, Ordering::SeqCst);
                WorkOutcome::succeeded()
            }
        })
    };
    lease.try_work("k", slow);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // first work is mid-flight
    lease.try_work("k", counting(&next_calls, WorkOutcome::succeeded()));
    assert!(lease.wait().await);

    assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("a", counting(&calls, WorkOutcome::failed(false)));
    lease.try_work("b", counting(&calls, WorkOutcome::succeeded()));
    assert!(lease.wait().await);

    assert_eq!(lease.state("a"), Some(LeaseState::Follower));
    assert_eq!(lease.state("b"), Some(LeaseState::Leader));
}

#[tokio::test(start_paused = true)]
async fn extend_drops_queued_work() {
    let lease = lease();
    let calls = Arc::new(AtomicUsize::new(0));

    // no worker yet, so the work stays queued
    lease.try_work("k", counting(&calls, WorkOutcome::succeeded()));
    assert!(lease.is_queued("k"));

    lease.extend("k");

    assert!(!lease.is_queued("k"));
    assert_eq!(lease.state("k"), Some(LeaseState::Leader));
    assert_eq!(lease.wait_until(Duration::from_millis(5)).await, Some(true));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn remove_forgets_key() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("k", counting(&calls, WorkOutcome::succeeded()));
    assert!(lease.wait().await);

    lease.remove("k");

    assert_eq!(lease.state("k"), None);
    assert!(lease.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_until_times_out_while_retrying() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("k", counting(&calls, WorkOutcome::failed(true)));
    let resolved = lease.wait_until(Duration::from_millis(500)).await;

    assert_eq!(resolved, None);
    assert!(calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn rearmed_success_runs_again_after_retry_interval() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));
    let work = {
        let calls = calls.clone();
        work_fn(move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    WorkOutcome::succeeded_and_rearm()
                } else {
                    WorkOutcome::succeeded()
                }
            }
        })
    };
    let start = Instant::now();

    lease.try_work("k", work);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // first run landed, the key is re-armed rather than idle
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lease.state("k"), Some(LeaseState::Leader));
    assert_eq!(lease.tick("k"), Some(0));
    assert!(lease.is_queued("k"));

    assert!(lease.wait().await);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(lease.state("k"), Some(LeaseState::Leader));
    assert_eq!(lease.tick("k"), Some(0));
    assert!(!lease.is_queued("k"));
}

#[tokio::test(start_paused = true)]
async fn skipped_work_resolves_as_not_leader() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    lease.try_work("k", counting(&calls, WorkOutcome::skipped()));
    let resolved = lease.wait_until(Duration::from_secs(1)).await;

    assert_eq!(resolved, Some(false));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lease.state("k"), Some(LeaseState::Election));
}

#[tokio::test(start_paused = true)]
async fn removing_key_wakes_waiter_while_work_runs() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let work = work_fn(|| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        WorkOutcome::succeeded()
    });

    lease.try_work("k", work);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let waiter = {
        let lease = lease.clone();
        tokio::spawn(async move { lease.wait_until(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    lease.remove("k");

    assert_eq!(waiter.await.unwrap(), Some(false));

    // the late outcome is discarded
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(lease.state("k"), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_suppresses_retry() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    let worker = lease.spawn(shutdown.subscribe());
    let calls = Arc::new(AtomicUsize::new(0));

    let work = {
        let calls = calls.clone();
        let shutdown = shutdown.clone();
        work_fn(move || {
            let calls = calls.clone();
            let shutdown = shutdown.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                shutdown.trigger();
                WorkOutcome::failed(true)
            }
        })
    };
    lease.try_work("k", work);
    worker.await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!lease.is_queued("k"));
    assert!(lease.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn wait_idle_returns_once_all_work_ran() {
    let lease = lease();
    let shutdown = ShutdownHandle::new();
    lease.spawn(shutdown.subscribe());
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    lease.try_work("a", counting(&a_calls, WorkOutcome::succeeded()));
    lease.try_work("b", flaky(&b_calls, 1));
    assert_eq!(lease.pending(), 2);

    let idle = lease.wait_idle(Duration::from_secs(5)).await;

    assert!(idle);
    assert_eq!(lease.pending(), 0);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
}
