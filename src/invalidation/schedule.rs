//! Scheduled invalidation sweeps.
//!
//! Two background loops: an hourly pass running every enabled strategy, and
//! a daily pass that first drops inactive entries, then runs the strategies
//! again. Missed ticks are skipped, not made up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::InvalidationEngine;

const SOURCE: &str = "scorta::invalidation::schedule";

/// Cadence for the background sweeps.
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub hourly: Duration,
    pub daily: Duration,
    /// Entries idle longer than this are dropped by the daily pass.
    pub inactivity_cutoff: Duration,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            hourly: Duration::from_secs(3600),
            daily: Duration::from_secs(86_400),
            inactivity_cutoff: Duration::from_secs(86_400),
        }
    }
}

/// Abort handles for the two sweep loops.
#[derive(Debug)]
pub struct ScheduleHandles {
    hourly: JoinHandle<()>,
    daily: JoinHandle<()>,
}

impl ScheduleHandles {
    /// Stop both loops. Entries already swept stay removed.
    pub fn shutdown(self) {
        self.hourly.abort();
        self.daily.abort();
    }
}

impl<T> InvalidationEngine<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn the hourly and daily sweep loops for this engine.
    ///
    /// Both loops skip their immediate first tick so a fresh process does
    /// not sweep an empty store.
    pub fn spawn_sweeps(engine: Arc<Self>, schedule: SweepSchedule) -> ScheduleHandles {
        let hourly_engine = engine.clone();
        let hourly = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(schedule.hourly);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = hourly_engine.apply_all_enabled();
                debug!(target_module = SOURCE, removed, "hourly strategy sweep finished");
            }
        });

        let daily = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(schedule.daily);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let inactive = engine.inactivity_sweep(schedule.inactivity_cutoff);
                let by_rule = engine.apply_all_enabled();
                debug!(
                    target_module = SOURCE,
                    inactive,
                    by_rule,
                    "daily deep sweep finished"
                );
            }
        });

        ScheduleHandles { hourly, daily }
    }
}
