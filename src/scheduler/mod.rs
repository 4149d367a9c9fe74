//! Daily scheduler.
//!
//! Runs a [`ScheduledJob`] once per local calendar day at the persisted
//! hour:minute. The last successful fire is written to disk so a restarted
//! process does not fire twice for the same target.

mod store;

pub use store::{ScheduleState, ScheduleStore};

use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest single sleep; the wall clock is re-read after each slice.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

/// Upper bound on waiting for the loop to exit in [`DailyScheduler::stop`]
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Work run on every fire.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    async fn run(&self) -> anyhow::Result<()>;
}

/// Next fire time after `now` for a daily trigger at `at`.
///
/// Today's target is used only if it is strictly in the future and
/// `last_run` is before it; otherwise the same time tomorrow.
pub fn next_fire<Tz: TimeZone>(
    now: &DateTime<Tz>,
    at: NaiveTime,
    last_run: Option<DateTime<Utc>>,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let target = resolve_local(&tz, today, at);

    let already_ran = last_run.map_or(false, |last| last >= target.with_timezone(&Utc));
    if target > *now && !already_ran {
        return target;
    }

    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    resolve_local(&tz, tomorrow, at)
}

/// Local date + time, taking the earlier instant when ambiguous and moving
/// past a DST gap.
fn resolve_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, at: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(at);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Background daily runner.
///
/// `start` spawns the loop; `stop` cancels it and waits a bounded time.
/// Both are idempotent.
pub struct DailyScheduler {
    job: Arc<dyn ScheduledJob>,
    store: Arc<ScheduleStore>,
    shutdown: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl DailyScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, store: ScheduleStore) -> Self {
        Self {
            job,
            store: Arc::new(store),
            shutdown: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Spawns the scheduling loop. No-op if it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.job),
            Arc::clone(&self.store),
            shutdown.clone(),
        ));

        self.shutdown = Some(shutdown);
        self.handle = Some(handle);
    }

    /// Signals the loop to exit and waits up to 5 seconds for it.
    ///
    /// A job that is mid-run when the bound elapses is aborted.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }

        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Scheduler task ended abnormally"),
            Err(_) => {
                warn!("Scheduler did not stop in time; aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
    }
}

async fn run_loop(job: Arc<dyn ScheduledJob>, store: Arc<ScheduleStore>, shutdown: CancellationToken) {
    let mut state = store.load();
    let Some(at) = state.time_of_day() else {
        error!(
            hour = state.hour,
            minute = state.minute,
            "Invalid schedule time; scheduler not started"
        );
        return;
    };

    info!(
        hour = state.hour,
        minute = state.minute,
        last_run = ?state.last_run,
        "Scheduler started"
    );

    loop {
        let target = next_fire(&Local::now(), at, state.last_run);
        info!(next_run = %target.to_rfc3339(), "Next run scheduled");

        if !wait_until(&target, &shutdown).await {
            debug!("Scheduler loop exiting");
            return;
        }

        debug!("Running scheduled job");
        match job.run().await {
            Ok(()) => {
                state.last_run = Some(Utc::now());
                if let Err(e) = store.save(&state) {
                    error!(error = %format!("{:#}", e), "Failed to persist last run");
                } else {
                    info!(last_run = ?state.last_run, "Scheduled job completed");
                }
            }
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    "Scheduled job failed; will retry at the next scheduled time"
                );
            }
        }
    }
}

/// Sleeps until `target`. Returns `false` if cancelled first.
async fn wait_until(target: &DateTime<Local>, shutdown: &CancellationToken) -> bool {
    loop {
        if shutdown.is_cancelled() {
            return false;
        }

        let remaining = match (*target - Local::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => return true,
        };

        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)) => {}
        }
    }
}
