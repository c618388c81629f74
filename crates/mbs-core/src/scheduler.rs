//! Three-cadence polling scheduler.
//!
//! Every base tick runs the heartbeat unconditionally, then evaluates the
//! config and detailed-data gates in that order. A gated cycle fires when it has
//! never run or when at least its interval has elapsed since it last ran, and
//! running it resets its timestamp whatever the outcome. Nothing a cycle
//! reports stops the loop, and a panicking cycle is reported as failed. Only
//! dropping the future (process interruption) ends it.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::future::{self, Future};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;

/// Default base tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(3);
/// Default interval between config syncs.
pub const DEFAULT_CONFIG_INTERVAL: Duration = Duration::from_secs(15);
/// Default interval between detailed-data syncs.
pub const DEFAULT_DATA_INTERVAL: Duration = Duration::from_secs(60);

/// Invalid scheduler settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("base tick must be greater than zero")]
    ZeroTick,
    #[error(
        "data interval ({data:?}) must be longer than config interval ({config:?})"
    )]
    IntervalOrder { config: Duration, data: Duration },
}

/// The three independently timed sync operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    Heartbeat,
    Config,
    DetailedData,
}

impl Cadence {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Config => "config",
            Self::DetailedData => "detailed_data",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle did its work.
    Completed,
    /// There was nothing to do, or a prerequisite was unavailable.
    Skipped(String),
    /// The cycle failed; it will run again at its next scheduled time.
    Failed(String),
}

impl CycleOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Source of elapsed time and sleeping for the scheduler.
pub trait Clock {
    /// Time elapsed since the clock started.
    fn elapsed(&self) -> Duration;
    /// Waits for the given duration.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// The work driven by the scheduler.
pub trait SyncCycles {
    fn heartbeat(&mut self) -> impl Future<Output = CycleOutcome>;
    fn sync_config(&mut self) -> impl Future<Output = CycleOutcome>;
    fn sync_data(&mut self) -> impl Future<Output = CycleOutcome>;
}

/// Timing settings for the three cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub tick: Duration,
    pub config_interval: Duration,
    pub data_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            config_interval: DEFAULT_CONFIG_INTERVAL,
            data_interval: DEFAULT_DATA_INTERVAL,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.tick.is_zero() {
            return Err(ScheduleError::ZeroTick);
        }
        if self.data_interval <= self.config_interval {
            return Err(ScheduleError::IntervalOrder {
                config: self.config_interval,
                data: self.data_interval,
            });
        }
        Ok(())
    }
}

/// Last-run instants of the gated cadences, as clock offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub last_config: Option<Duration>,
    pub last_data: Option<Duration>,
}

/// What ran during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub heartbeat: CycleOutcome,
    pub config: Option<CycleOutcome>,
    pub data: Option<CycleOutcome>,
}

/// Drives [`SyncCycles`] on three cadences.
#[derive(Debug)]
pub struct Scheduler<C> {
    config: ScheduleConfig,
    clock: C,
    state: SyncState,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(config: ScheduleConfig, clock: C) -> Result<Self, ScheduleError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: SyncState::default(),
        })
    }

    pub const fn state(&self) -> &SyncState {
        &self.state
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs one tick: heartbeat, then each gated cycle that is due.
    pub async fn tick<S: SyncCycles>(&mut self, cycles: &mut S) -> TickReport {
        let heartbeat = guarded(cycles.heartbeat()).await;
        log_outcome(Cadence::Heartbeat, &heartbeat);

        let now = self.clock.elapsed();

        let config = if is_due(self.state.last_config, now, self.config.config_interval) {
            let outcome = guarded(cycles.sync_config()).await;
            log_outcome(Cadence::Config, &outcome);
            self.state.last_config = Some(now);
            Some(outcome)
        } else {
            None
        };

        let data = if is_due(self.state.last_data, now, self.config.data_interval) {
            let outcome = guarded(cycles.sync_data()).await;
            log_outcome(Cadence::DetailedData, &outcome);
            self.state.last_data = Some(now);
            Some(outcome)
        } else {
            None
        };

        TickReport {
            heartbeat,
            config,
            data,
        }
    }

    /// Runs a fixed number of ticks, sleeping one base tick between them.
    pub async fn run_ticks<S: SyncCycles>(&mut self, cycles: &mut S, ticks: u64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for index in 0..ticks {
            reports.push(self.tick(cycles).await);
            if index + 1 < ticks {
                self.clock.sleep(self.config.tick).await;
            }
        }
        reports
    }

    /// Runs forever. Stop it by dropping the future.
    pub async fn run<S: SyncCycles>(&mut self, cycles: &mut S) {
        tracing::info!(
            tick = ?self.config.tick,
            config_interval = ?self.config.config_interval,
            data_interval = ?self.config.data_interval,
            "scheduler started"
        );
        loop {
            self.tick(cycles).await;
            self.clock.sleep(self.config.tick).await;
        }
    }
}

/// Awaits a cycle, turning a panic into [`CycleOutcome::Failed`].
async fn guarded(cycle: impl Future<Output = CycleOutcome>) -> CycleOutcome {
    AssertUnwindSafe(cycle).catch_unwind().await.unwrap_or_else(|panic| {
        CycleOutcome::failed(format!("cycle panicked: {}", panic_message(&*panic)))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn is_due(last: Option<Duration>, now: Duration, interval: Duration) -> bool {
    last.is_none_or(|last| now.saturating_sub(last) >= interval)
}

fn log_outcome(cadence: Cadence, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed => tracing::debug!(%cadence, "cycle completed"),
        CycleOutcome::Skipped(reason) => tracing::debug!(%cadence, reason = %reason, "cycle skipped"),
        CycleOutcome::Failed(reason) => tracing::error!(%cadence, reason = %reason, "cycle failed"),
    }
}

/// A clock that only advances when slept on or told to.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for VirtualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        self.advance(duration);
        future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        heartbeats: usize,
        configs: usize,
        data: usize,
        fail_config: bool,
        panic_data: bool,
    }

    impl SyncCycles for Counting {
        async fn heartbeat(&mut self) -> CycleOutcome {
            self.heartbeats += 1;
            CycleOutcome::Completed
        }

        async fn sync_config(&mut self) -> CycleOutcome {
            self.configs += 1;
            if self.fail_config {
                CycleOutcome::failed("backend unreachable")
            } else {
                CycleOutcome::Completed
            }
        }

        async fn sync_data(&mut self) -> CycleOutcome {
            self.data += 1;
            assert!(!self.panic_data, "database driver exploded");
            CycleOutcome::skipped("nothing to sync")
        }
    }

    fn scheduler() -> Scheduler<VirtualClock> {
        Scheduler::new(ScheduleConfig::default(), VirtualClock::new()).unwrap()
    }

    #[tokio::test]
    async fn cadences_fire_at_their_rates_over_180_ticks() {
        let mut scheduler = scheduler();
        let mut cycles = Counting::default();

        scheduler.run_ticks(&mut cycles, 180).await;

        assert_eq!(cycles.heartbeats, 180);
        assert_eq!(cycles.configs, 36);
        assert_eq!(cycles.data, 9);
    }

    #[tokio::test]
    async fn first_tick_runs_every_cycle() {
        let mut scheduler = scheduler();
        let mut cycles = Counting::default();

        let report = scheduler.tick(&mut cycles).await;

        assert_eq!(report.heartbeat, CycleOutcome::Completed);
        assert_eq!(report.config, Some(CycleOutcome::Completed));
        assert_eq!(
            report.data,
            Some(CycleOutcome::Skipped("nothing to sync".to_string()))
        );
        assert_eq!(scheduler.state().last_config, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn failed_cycle_does_not_stop_next_heartbeat() {
        let mut scheduler = scheduler();
        let mut cycles = Counting {
            fail_config: true,
            ..Counting::default()
        };

        let reports = scheduler.run_ticks(&mut cycles, 2).await;

        assert!(reports[0].config.as_ref().is_some_and(CycleOutcome::is_failed));
        assert_eq!(reports[1].heartbeat, CycleOutcome::Completed);
        assert_eq!(cycles.heartbeats, 2);
    }

    #[tokio::test]
    async fn panicking_cycle_is_reported_and_loop_continues() {
        let mut scheduler = scheduler();
        let mut cycles = Counting {
            panic_data: true,
            ..Counting::default()
        };

        let reports = scheduler.run_ticks(&mut cycles, 2).await;

        assert_eq!(
            reports[0].data,
            Some(CycleOutcome::failed("cycle panicked: database driver exploded"))
        );
        assert_eq!(reports[1].heartbeat, CycleOutcome::Completed);
        assert_eq!(cycles.heartbeats, 2);
        assert_eq!(scheduler.state().last_data, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn failed_cycle_waits_for_its_full_interval() {
        let mut scheduler = scheduler();
        let mut cycles = Counting {
            fail_config: true,
            ..Counting::default()
        };

        // 0s, 3s, 6s, 9s, 12s: only the first tick is due
        scheduler.run_ticks(&mut cycles, 5).await;
        assert_eq!(cycles.configs, 1);

        scheduler.clock().advance(DEFAULT_TICK);
        scheduler.tick(&mut cycles).await;
        assert_eq!(cycles.configs, 2);
    }

    #[tokio::test]
    async fn slow_heartbeat_delays_gate_evaluation() {
        let mut scheduler = scheduler();
        let mut cycles = Counting::default();
        scheduler.tick(&mut cycles).await;

        scheduler.clock().advance(Duration::from_secs(14));
        assert!(scheduler.tick(&mut cycles).await.config.is_none());

        scheduler.clock().advance(Duration::from_secs(1));
        assert!(scheduler.tick(&mut cycles).await.config.is_some());
    }

    #[test]
    fn rejects_data_interval_not_longer_than_config() {
        let config = ScheduleConfig {
            tick: DEFAULT_TICK,
            config_interval: Duration::from_secs(60),
            data_interval: Duration::from_secs(60),
        };
        assert!(matches!(
            Scheduler::new(config, VirtualClock::new()),
            Err(ScheduleError::IntervalOrder { .. })
        ));
    }

    #[test]
    fn rejects_zero_tick() {
        let config = ScheduleConfig {
            tick: Duration::ZERO,
            ..ScheduleConfig::default()
        };
        assert_eq!(config.validate(), Err(ScheduleError::ZeroTick));
    }

    #[test]
    fn outcome_display_includes_reason() {
        assert_eq!(CycleOutcome::failed("boom").to_string(), "failed: boom");
        assert_eq!(CycleOutcome::skipped("idle").to_string(), "skipped: idle");
    }
}
