//! Fixed-interval timers for greenroom.
//!
//! Three kinds of recurring work run inside the engine: each client's
//! heartbeat probe, the metrics collector and the metrics flush. All of them
//! sit on a [`Ticker`], which fires at a fixed period and reports when it
//! woke up late.
//!
//! [`spawn_repeating`] wraps a ticker in its own task and returns a
//! [`RepeatingTask`] handle that stops it cleanly at shutdown:
//!
//! ```ignore
//! let flush = spawn_repeating("metrics-flush", TickConfig::every(secs(10)), move |_| {
//!     let reporter = Arc::clone(&reporter);
//!     async move { reporter.flush() }
//! });
//! // ...
//! flush.stop().await;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the ticker wakes up later than scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one a full period
    /// from now.
    #[default]
    Skip,
    /// Keep the original cadence: the next tick is due one period after
    /// the deadline that was missed.
    Drop,
}

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks.
    pub period: Duration,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Upper bound of random extra delay before the *first* tick. Spreads
    /// out heartbeats of clients that connected in the same burst.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            policy: TickPolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// Shortest period accepted; anything below is clamped.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A config firing every `period` with default policy and no jitter.
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`Ticker::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_us = self.period.as_micros() as u64,
                "tick period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info and stats
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`Ticker::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if the tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun (Skip policy only).
    pub ticks_skipped: u64,
}

/// Counters accumulated over a ticker's lifetime.
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// A fixed-interval ticker.
///
/// [`wait_for_tick`](Self::wait_for_tick) is cancel-safe: internal state is
/// only updated after the sleep completes, so it can sit in a
/// `tokio::select!` next to other branches.
#[derive(Debug)]
pub struct Ticker {
    config: TickConfig,
    tick_count: u64,
    next_tick: TokioInstant,
    stats: TickStats,
}

impl Ticker {
    /// Creates a ticker whose first tick fires one period (plus jitter)
    /// from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..max.max(1)))
        };

        trace!(
            period_ms = config.period.as_millis() as u64,
            policy = ?config.policy,
            "ticker created"
        );

        Self {
            next_tick: TokioInstant::now() + config.period + jitter,
            config,
            tick_count: 0,
            stats: TickStats::default(),
        }
    }

    /// Shorthand for `Ticker::new(TickConfig::every(period))`.
    pub fn every(period: Duration) -> Self {
        Self::new(TickConfig::every(period))
    }

    /// Waits until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        let period = self.config.period;

        time::sleep_until(due).await;

        let now = TokioInstant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_millis() as u64,
                            "timer overrun, skipping ahead"
                        );
                    }
                }
                now + period
            }
            TickPolicy::Drop => due + period,
        };

        if overrun {
            self.stats.total_overruns += 1;
        }
        self.stats.total_skipped += ticks_skipped;
        self.stats.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The (validated) period.
    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}

// ---------------------------------------------------------------------------
// RepeatingTask
// ---------------------------------------------------------------------------

/// Handle to a job running on its own ticker task.
///
/// Dropping the handle also stops the task (at its next suspension point);
/// [`stop`](Self::stop) additionally waits for it to finish.
#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Spawns `job` to run on every tick of a new [`Ticker`].
///
/// Each invocation is awaited before the ticker is polled again, so runs of
/// the same job never overlap.
pub fn spawn_repeating<F, Fut>(name: &'static str, config: TickConfig, mut job: F) -> RepeatingTask
where
    F: FnMut(TickInfo) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ticker = Ticker::new(config);
        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                info = ticker.wait_for_tick() => job(info).await,
            }
        }
        debug!(task = name, ticks = ticker.tick_count(), "repeating task stopped");
    });

    debug!(task = name, "repeating task started");
    RepeatingTask { name, stop, handle }
}

impl RepeatingTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(task = self.name, "repeating task panicked");
            }
        }
    }
}
