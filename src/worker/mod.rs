//! Periodic jobs: the collection loop, the nightly retention purge, and the
//! daily report. Each job is a plain loop that sleeps to its next firing;
//! replacing a job interrupts the sleep, never an in-flight cycle.

mod collect;
mod report;
mod retention;

use crate::config::SharedConfig;
use crate::constants::STARTUP_COLLECT_DELAY_SECS;
use crate::services::{AlertEngine, Collector, PriceStore};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

struct Job {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl Job {
    fn spawn<F>(task: impl FnOnce(watch::Receiver<bool>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(task(stop_rx));
        Self { handle, stop }
    }

    fn stop(self) {
        // The job exits after its current cycle; the sleep is the only
        // point that reacts immediately.
        let _ = self.stop.send(true);
    }

    fn running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Owns the three periodic jobs and replaces them when configuration
/// changes. Schedules are re-derived from the config snapshot current at
/// spawn time.
pub struct Scheduler {
    store: Arc<PriceStore>,
    collector: Arc<Collector>,
    alerts: Arc<AlertEngine>,
    config: SharedConfig,
    collection_job: Mutex<Option<Job>>,
    retention_job: Mutex<Option<Job>>,
    report_job: Mutex<Option<Job>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<PriceStore>,
        collector: Arc<Collector>,
        alerts: Arc<AlertEngine>,
        config: SharedConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            collector,
            alerts,
            config,
            collection_job: Mutex::new(None),
            retention_job: Mutex::new(None),
            report_job: Mutex::new(None),
        })
    }

    /// Spawn all jobs plus the one-off startup collection.
    pub async fn start(&self) {
        self.restart_collection().await;
        self.restart_report().await;

        let mut slot = self.retention_job.lock().await;
        if slot.is_none() {
            let store = self.store.clone();
            let config = self.config.clone();
            *slot = Some(Job::spawn(move |stop| retention::run(store, config, stop)));
        }
        drop(slot);

        let collector = self.collector.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(STARTUP_COLLECT_DELAY_SECS)).await;
            info!("Startup collection");
            collector.collect_all().await;
        });
    }

    /// Tear down and respawn the collection job (interval changed).
    pub async fn restart_collection(&self) {
        let mut slot = self.collection_job.lock().await;
        if let Some(job) = slot.take() {
            job.stop();
        }
        let collector = self.collector.clone();
        let config = self.config.clone();
        *slot = Some(Job::spawn(move |stop| collect::run(collector, config, stop)));
        info!("Collection job scheduled");
    }

    /// Tear down and respawn the daily-report job (time-of-day changed).
    pub async fn restart_report(&self) {
        let mut slot = self.report_job.lock().await;
        if let Some(job) = slot.take() {
            job.stop();
        }
        let alerts = self.alerts.clone();
        let config = self.config.clone();
        *slot = Some(Job::spawn(move |stop| report::run(alerts, config, stop)));
        info!("Daily-report job scheduled");
    }

    pub async fn collection_running(&self) -> bool {
        self.collection_job
            .lock()
            .await
            .as_ref()
            .map(Job::running)
            .unwrap_or(false)
    }

    /// Signal every job to stop after its current cycle.
    pub async fn shutdown(&self) {
        for slot in [&self.collection_job, &self.retention_job, &self.report_job] {
            if let Some(job) = slot.lock().await.take() {
                job.stop();
            }
        }
        info!("Scheduler stopped");
    }
}

/// Next firing of a local time-of-day schedule, as a UTC instant.
/// Skips forward over local-time gaps.
pub(crate) fn next_occurrence(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();
    if local_now.time() >= at {
        if let Some(next) = date.succ_opt() {
            date = next;
        }
    }
    loop {
        match tz.from_local_datetime(&date.and_time(at)).earliest() {
            Some(local) => return local.with_timezone(&Utc),
            None => match date.succ_opt() {
                Some(next) => date = next,
                None => return now,
            },
        }
    }
}

/// Sleep duration until `next`, saturating at zero.
pub(crate) fn until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SCHEDULE_TZ;

    #[test]
    fn test_next_occurrence_later_today() {
        // 2025-06-15 10:00 UTC is 18:00 in Asia/Shanghai.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let next = next_occurrence(now, at, SCHEDULE_TZ);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        // 18:00 local is already past 08:00 local.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let next = next_occurrence(now, at, SCHEDULE_TZ);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let next = next_occurrence(now, NaiveTime::MIN, SCHEDULE_TZ);
        // Next local midnight in Shanghai is 16:00 UTC.
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 15, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_until_saturates() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(until(now, now + chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            until(now + chrono::Duration::seconds(5), now),
            Duration::from_secs(5)
        );
    }
}
