//! Integration tests for the ticker and repeating tasks.
//!
//! All async tests run with a paused clock: tokio auto-advances time when
//! every task is idle, so a 15 second heartbeat period costs nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use greenroom_tick::{TickConfig, TickPolicy, Ticker, spawn_repeating};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// =========================================================================
// Ticker cadence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_after_one_period() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::every(secs(15));

    let info = ticker.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert_eq!(start.elapsed(), secs(15));
    assert!(!info.overrun);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_numbered_sequentially() {
    let mut ticker = Ticker::every(secs(1));
    for expected in 1..=5 {
        assert_eq!(ticker.wait_for_tick().await.tick, expected);
    }
    assert_eq!(ticker.tick_count(), 5);
    assert_eq!(ticker.stats().total_ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_within_bound() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::new(TickConfig {
        initial_jitter: Duration::from_millis(500),
        ..TickConfig::every(secs(1))
    });

    ticker.wait_for_tick().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= secs(1));
    assert!(elapsed < secs(1) + Duration::from_millis(500));
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_skipped_periods() {
    let mut ticker = Ticker::every(secs(1));
    ticker.wait_for_tick().await;

    // Stall for three and a half periods before polling again.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let info = ticker.wait_for_tick().await;

    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);
    assert_eq!(ticker.stats().total_overruns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reschedules_from_now() {
    let mut ticker = Ticker::every(secs(1));
    ticker.wait_for_tick().await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    ticker.wait_for_tick().await;

    let before = tokio::time::Instant::now();
    ticker.wait_for_tick().await;
    assert_eq!(before.elapsed(), secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_cadence() {
    let mut ticker = Ticker::new(TickConfig {
        policy: TickPolicy::Drop,
        ..TickConfig::every(secs(1))
    });
    let start = tokio::time::Instant::now();
    ticker.wait_for_tick().await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let late = ticker.wait_for_tick().await;
    assert!(late.overrun);
    assert_eq!(late.ticks_skipped, 0);

    // Third tick is due at t=3s regardless of the late second tick.
    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed(), secs(3));
}

// =========================================================================
// RepeatingTask
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_repeating_task_runs_job_each_period() {
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    let task = spawn_repeating("counter", TickConfig::every(secs(10)), move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    task.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeating_task_stop_halts_job() {
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    let task = spawn_repeating("counter", TickConfig::every(secs(1)), move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    task.stop().await;
    let after_stop = runs.load(Ordering::SeqCst);

    tokio::time::sleep(secs(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    assert_eq!(after_stop, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_task() {
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    let task = spawn_repeating("counter", TickConfig::every(secs(1)), move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(task.name(), "counter");
    drop(task);

    tokio::time::sleep(secs(5)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
