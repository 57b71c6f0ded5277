//! Refresh Scheduler
//!
//! Background task that clears and reloads the cache on a fixed cadence.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::service::CacheService;

// == Refresh Schedule ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSchedule {
    /// Once a day at this wall-clock time
    DailyAt(NaiveTime),
    /// Rolling interval from the previous refresh
    Every(Duration),
}

impl RefreshSchedule {
    // == Next Delay ==
    /// Time to wait from `now` until the next refresh.
    ///
    /// For `DailyAt`, a target equal to `now` rolls over to the next day.
    pub fn next_delay<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        match self {
            RefreshSchedule::Every(interval) => *interval,
            RefreshSchedule::DailyAt(at) => {
                let local = now.naive_local();
                let mut target = local.date().and_time(*at);
                if target <= local {
                    target += chrono::Duration::days(1);
                }

                // A target inside a DST gap has no local instant; fall back to 24h
                let tz = now.timezone();
                let next = tz
                    .from_local_datetime(&target)
                    .earliest()
                    .unwrap_or_else(|| now.clone() + chrono::Duration::days(1));

                (next - now.clone()).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

/// Spawns the scheduler that runs `clear_cache` + `load_initial_cache` on `schedule`.
///
/// The first refresh happens after the first scheduled delay, not immediately.
/// The task exits as soon as `shutdown` flips to true, even mid-sleep.
pub fn spawn_refresh_task(
    service: CacheService,
    schedule: RefreshSchedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?schedule, "Starting refresh scheduler");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = schedule.next_delay(&Local::now());
            info!(delay_secs = delay.as_secs(), "Next cache refresh scheduled");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let generation = service.clear_cache().await;
            let report = service.load_initial_cache().await;
            info!(
                generation = %generation,
                entries_loaded = report.entries_loaded,
                subscribed = report.subscribed,
                "Scheduled cache refresh complete"
            );
        }

        info!("Refresh scheduler stopped");
    })
}
