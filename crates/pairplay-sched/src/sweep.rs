//! Fixed-interval sweep ticker.
//!
//! Drives periodic maintenance (stale-connection reconciliation, expired
//! intents, the stats log) from inside a `tokio::select!` loop:
//!
//! ```ignore
//! let mut ticker = SweepTicker::new(SweepConfig::default());
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         info = ticker.wait_for_sweep() => {
//!             core.sweep().await;
//!             ticker.record_sweep_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Configuration for a [`SweepTicker`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. `Duration::ZERO` disables sweeping:
    /// [`SweepTicker::wait_for_sweep`] then pends forever.
    pub interval: Duration,
    /// Upper bound of the random delay added to the first sweep so that
    /// several servers started together don't sweep in lockstep.
    pub initial_jitter: Duration,
    /// Fraction of `interval` a single sweep may take before a warning
    /// is logged. Clamped to `0.0..=1.0`.
    pub budget_warn_threshold: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            initial_jitter: Duration::from_millis(500),
            budget_warn_threshold: 0.5,
        }
    }
}

impl SweepConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`SweepTicker::new`].
    pub fn validated(mut self) -> Self {
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// `false` when `interval` is zero.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Returned by [`SweepTicker::wait_for_sweep`].
#[derive(Debug, Clone)]
pub struct SweepInfo {
    /// Monotonically increasing sweep number, starting at 1.
    pub sweep: u64,
    /// `true` if the sweep fired more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals that were skipped because of the overrun.
    pub sweeps_skipped: u64,
}

/// Fires at a fixed interval. Missed intervals are skipped, never
/// replayed in a burst.
pub struct SweepTicker {
    config: SweepConfig,
    sweep_count: u64,
    next_sweep: Option<TokioInstant>,
    sweep_start: Option<TokioInstant>,
}

impl SweepTicker {
    pub fn new(config: SweepConfig) -> Self {
        let config = config.validated();

        let next_sweep = config.is_enabled().then(|| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max.max(1)))
            };
            TokioInstant::now() + config.interval + jitter
        });

        if config.is_enabled() {
            debug!(interval_ms = config.interval.as_millis() as u64, "sweep ticker created");
        } else {
            debug!("sweep ticker created with sweeping disabled");
        }

        Self {
            config,
            sweep_count: 0,
            next_sweep,
            sweep_start: None,
        }
    }

    /// Waits until the next sweep is due.
    ///
    /// Pends forever when sweeping is disabled; inside `select!` the
    /// other branches keep running.
    pub async fn wait_for_sweep(&mut self) -> SweepInfo {
        let Some(next) = self.next_sweep else {
            return std::future::pending().await;
        };
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.sweep_count += 1;
        self.sweep_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;
        let mut sweeps_skipped = 0;
        if overrun {
            sweeps_skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
            if sweeps_skipped > 0 {
                warn!(
                    sweep = self.sweep_count,
                    skipped = sweeps_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "sweep overrun, skipping ahead"
                );
            }
        }
        self.next_sweep = Some(now + interval);

        trace!(sweep = self.sweep_count, overrun, "sweep fired");

        SweepInfo {
            sweep: self.sweep_count,
            overrun,
            sweeps_skipped,
        }
    }

    /// Records that the work for the current sweep is done and returns
    /// how long it took on the Tokio clock. `None` if no sweep is in
    /// progress.
    pub fn record_sweep_end(&mut self) -> Option<Duration> {
        let start = self.sweep_start.take()?;
        let elapsed = start.elapsed();

        let budget = self.config.interval.as_secs_f64();
        if budget > 0.0 && elapsed.as_secs_f64() / budget >= self.config.budget_warn_threshold {
            warn!(
                sweep = self.sweep_count,
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = self.config.interval.as_millis() as u64,
                "sweep took a large share of its interval"
            );
        }
        Some(elapsed)
    }
}
