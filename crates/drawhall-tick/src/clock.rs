//! The master clock: one fixed-period tick for the whole process.
//!
//! Every round, countdown and grace deadline is a row in the
//! [`TimerScheduler`](crate::TimerScheduler) table. The only thing that
//! actually sleeps is this clock, which wakes once per `tick_period` and
//! lets the engine scan the table.
//!
//! It sits inside the engine's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* handle command */ }
//!         tick = clock.wait_for_tick() => {
//!             engine.step(tick.now).await;
//!             clock.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

use crate::TimerConfig;

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`MasterClock::wait_for_tick`].
#[derive(Debug, Clone, Copy)]
pub struct ClockTick {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// The instant the tick fired. Pass this to `TimerScheduler::tick`.
    pub now: TokioInstant,
    /// `true` if the tick woke up more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the master clock.
///
/// Timing values refer to the engine work reported through
/// [`MasterClock::record_tick_end`], not to the sleep itself.
#[derive(Debug, Clone)]
pub struct ClockMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of tick work (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last tick's work divided by the period. Above 1.0 means overrun.
    pub budget_utilization: f64,
}

impl Default for ClockMetrics {
    fn default() -> Self {
        Self {
            total_ticks: 0,
            total_overruns: 0,
            total_skipped: 0,
            avg_tick_time: Duration::ZERO,
            max_tick_time: Duration::ZERO,
            budget_utilization: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Fixed-period clock. Late wake-ups skip ahead instead of bursting, so a
/// stalled process never replays a backlog of ticks.
pub struct MasterClock {
    period: Duration,
    budget_warn_threshold: f64,
    tick_count: u64,
    next_tick: TokioInstant,
    /// Wall-clock start of the current tick's work.
    tick_start: Option<Instant>,
    paused: bool,
    metrics: ClockMetrics,
}

impl MasterClock {
    /// Creates a clock whose first tick fires one period from now.
    pub fn new(period: Duration) -> Self {
        let period = if period.is_zero() {
            warn!("master clock period of zero, using 1ms");
            Duration::from_millis(1)
        } else {
            period
        };
        debug!(period_ms = period.as_secs_f64() * 1000.0, "master clock created");
        Self {
            period,
            budget_warn_threshold: 0.80,
            tick_count: 0,
            next_tick: TokioInstant::now() + period,
            tick_start: None,
            paused: false,
            metrics: ClockMetrics::default(),
        }
    }

    pub fn from_config(config: &TimerConfig) -> Self {
        let mut clock = Self::new(config.tick_period());
        clock.budget_warn_threshold = config.budget_warn_threshold.clamp(0.0, 1.0);
        clock
    }

    /// Waits until the next tick is due.
    ///
    /// While paused this future never resolves, which lets `select!` keep
    /// serving its other branches.
    pub async fn wait_for_tick(&mut self) -> ClockTick {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.period / 10;
        let mut ticks_skipped = 0u64;
        if overrun {
            ticks_skipped = (late_by.as_nanos() / self.period.as_nanos()) as u64;
            self.metrics.total_overruns += 1;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "master clock overrun, skipping ahead"
                );
            }
        }
        // Always schedule from now, not from the missed deadline.
        self.next_tick = now + self.period;

        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;
        trace!(tick = self.tick_count, overrun, "master tick");

        ClockTick {
            tick: self.tick_count,
            now,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the engine finished the work for the current tick.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.period.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick work exceeded the clock period"
            );
        } else if utilization >= self.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick work approaching the clock period"
            );
        }

        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Stops the clock. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "master clock paused");
        }
    }

    /// Restarts the clock one period from now, without a catch-up burst.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_tick = TokioInstant::now() + self.period;
            debug!(tick = self.tick_count, "master clock resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn metrics(&self) -> &ClockMetrics {
        &self.metrics
    }
}
