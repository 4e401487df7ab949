//! Recurring job scheduler.
//!
//! Jobs are injected at construction and nothing runs until `start()`.
//! Weekday schedules are evaluated on the wall clock of a fixed UTC offset;
//! daylight saving shifts are not applied.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Monday to Friday at a local wall-clock time
    Weekdays { at: NaiveTime },
    /// Fixed interval, first run one interval after start
    Every(Duration),
}

type JobAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named, scheduled unit of work.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    pub schedule: Schedule,
    action: JobAction,
}

impl Job {
    pub fn new<F, Fut>(name: impl Into<String>, schedule: Schedule, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            schedule,
            action: Arc::new(move || action().boxed()),
        }
    }

    /// Same name and schedule, different work.
    pub fn with_action<F, Fut>(self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(self.name, self.schedule, action)
    }

    /// Run once, outside the schedule.
    pub async fn run(&self) -> Result<()> {
        (self.action)().await
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// The standard job table: morning setup, daily report, model refresh.
pub fn default_jobs() -> Vec<Job> {
    vec![
        Job::new(
            "morning_setup",
            Schedule::Weekdays { at: wall_time(8, 0) },
            || async {
                info!("Morning setup: refresh symbols, warm models");
                anyhow::Ok(())
            },
        ),
        Job::new(
            "daily_report",
            Schedule::Weekdays { at: wall_time(16, 5) },
            || async {
                info!("Generating daily report");
                anyhow::Ok(())
            },
        ),
        Job::new(
            "model_refresh",
            Schedule::Every(Duration::from_secs(10 * 60)),
            || async {
                info!("Refreshing models on recent bars");
                anyhow::Ok(())
            },
        ),
    ]
}

fn wall_time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// First fire time strictly after `after`.
pub fn next_fire_after(
    schedule: &Schedule,
    after: DateTime<Utc>,
    offset: FixedOffset,
) -> DateTime<Utc> {
    match schedule {
        Schedule::Every(interval) => {
            after + TimeDelta::from_std(*interval).unwrap_or(TimeDelta::days(1))
        }
        Schedule::Weekdays { at } => {
            let local_date = after.with_timezone(&offset).date_naive();
            (0..8)
                .filter_map(|days| local_date.checked_add_signed(TimeDelta::days(days)))
                .filter(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
                .filter_map(|date| offset.from_local_datetime(&date.and_time(*at)).single())
                .map(|local| local.with_timezone(&Utc))
                .find(|fire| *fire > after)
                .unwrap_or(after + TimeDelta::weeks(1))
        }
    }
}

/// Runs a job table on a background task until stopped.
pub struct JobScheduler {
    jobs: Vec<Job>,
    offset: FixedOffset,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new(jobs: Vec<Job>, offset: FixedOffset) -> Self {
        Self {
            jobs,
            offset,
            shutdown: None,
            handle: None,
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the scheduling loop.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("Scheduler already started");
        }
        if self.jobs.is_empty() {
            bail!("Scheduler has no jobs");
        }
        if let Some(job) = self
            .jobs
            .iter()
            .find(|j| j.schedule == Schedule::Every(Duration::ZERO))
        {
            bail!("Job {} has a zero interval", job.name);
        }

        let (tx, rx) = watch::channel(false);
        let jobs = self.jobs.clone();
        let offset = self.offset;

        info!(jobs = jobs.len(), offset = %offset, "Starting scheduler");
        self.handle = Some(tokio::spawn(run_loop(jobs, offset, rx)));
        self.shutdown = Some(tx);
        Ok(())
    }

    /// Signal the loop to exit and wait for it. A job already running finishes first.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            handle.await?;
            info!("Scheduler stopped");
        }
        Ok(())
    }
}

async fn run_loop(jobs: Vec<Job>, offset: FixedOffset, mut shutdown: watch::Receiver<bool>) {
    let now = Utc::now();
    let mut next: Vec<DateTime<Utc>> = jobs
        .iter()
        .map(|job| next_fire_after(&job.schedule, now, offset))
        .collect();

    for (job, at) in jobs.iter().zip(&next) {
        debug!(job = %job.name, next = %at, "Scheduled job");
    }

    loop {
        let Some(due) = next.iter().min().copied() else {
            return;
        };
        let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return,
        }

        let now = Utc::now();
        for (job, at) in jobs.iter().zip(next.iter_mut()) {
            if *at > now {
                continue;
            }

            info!(job = %job.name, "Running job");
            if let Err(e) = job.run().await {
                error!(job = %job.name, error = %e, "Job failed");
            }

            // Keep cadence from the slot unless the job overran it
            let slot = next_fire_after(&job.schedule, *at, offset);
            *at = if slot > now {
                slot
            } else {
                next_fire_after(&job.schedule, now, offset)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn eastern() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_weekday_same_day_before_time() {
        // Wednesday 2024-03-06 07:00 local
        let after = utc(2024, 3, 6, 12, 0);
        let at = Schedule::Weekdays { at: wall_time(8, 0) };
        assert_eq!(next_fire_after(&at, after, eastern()), utc(2024, 3, 6, 13, 0));
    }

    #[test]
    fn test_weekday_exact_time_moves_to_next_day() {
        let after = utc(2024, 3, 6, 13, 0);
        let at = Schedule::Weekdays { at: wall_time(8, 0) };
        assert_eq!(next_fire_after(&at, after, eastern()), utc(2024, 3, 7, 13, 0));
    }

    #[test]
    fn test_friday_evening_rolls_to_monday() {
        // Friday 2024-03-08 09:00 local
        let after = utc(2024, 3, 8, 14, 0);
        let at = Schedule::Weekdays { at: wall_time(8, 0) };
        assert_eq!(next_fire_after(&at, after, eastern()), utc(2024, 3, 11, 13, 0));

        // Saturday
        let sat = utc(2024, 3, 9, 15, 0);
        assert_eq!(next_fire_after(&at, sat, eastern()), utc(2024, 3, 11, 13, 0));
    }

    #[test]
    fn test_local_date_differs_from_utc_date() {
        // Friday 2024-03-08 23:30 local is already Saturday in UTC
        let after = utc(2024, 3, 9, 4, 30);
        let report = Schedule::Weekdays { at: wall_time(16, 5) };
        assert_eq!(next_fire_after(&report, after, eastern()), utc(2024, 3, 11, 21, 5));
    }

    #[test]
    fn test_every_interval() {
        let after = utc(2024, 3, 9, 4, 30);
        let every = Schedule::Every(Duration::from_secs(600));
        assert_eq!(next_fire_after(&every, after, eastern()), utc(2024, 3, 9, 4, 40));
    }

    #[test]
    fn test_default_jobs() {
        let jobs = default_jobs();
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["morning_setup", "daily_report", "model_refresh"]);
        assert_eq!(jobs[2].schedule, Schedule::Every(Duration::from_secs(600)));
        assert!(tokio_test::block_on(jobs[0].run()).is_ok());
    }

    #[tokio::test]
    async fn test_with_action_replaces_work() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let job = default_jobs().remove(1).with_action(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });

        assert_eq!(job.name, "daily_report");
        assert_eq!(job.schedule, Schedule::Weekdays { at: wall_time(16, 5) });
        job.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let runs = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let ok_job = Job::new("tick", Schedule::Every(Duration::from_millis(20)), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });
        let failing = failures.clone();
        let bad_job = Job::new("broken", Schedule::Every(Duration::from_millis(20)), move || {
            let failing = failing.clone();
            async move {
                failing.fetch_add(1, Ordering::SeqCst);
                let result: Result<()> = Err(anyhow::anyhow!("boom"));
                result
            }
        });

        let mut scheduler = JobScheduler::new(vec![ok_job, bad_job], eastern());
        assert!(!scheduler.is_running());
        scheduler.start().unwrap();
        assert!(scheduler.start().is_err());
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());

        // A failing job neither stops the loop nor the other jobs
        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert!(failures.load(Ordering::SeqCst) >= 2);

        let settled = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_tables() {
        let mut empty = JobScheduler::new(Vec::new(), eastern());
        assert!(empty.start().is_err());

        let zero = Job::new("spin", Schedule::Every(Duration::ZERO), || async { anyhow::Ok(()) });
        let mut scheduler = JobScheduler::new(vec![zero], eastern());
        assert!(scheduler.start().is_err());

        // Stopping a scheduler that never started is a no-op
        assert!(scheduler.stop().await.is_ok());
    }
}
