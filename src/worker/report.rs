use super::{next_occurrence, until};
use crate::config::SharedConfig;
use crate::constants::SCHEDULE_TZ;
use crate::services::AlertEngine;
use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, instrument};

/// Daily-report loop: fires at the configured local time of day. Whether the
/// report is enabled is checked at fire time; a changed time of day requires
/// a job restart (the scheduler handles that on config updates).
#[instrument(skip(alerts, config, stop))]
pub(super) async fn run(
    alerts: Arc<AlertEngine>,
    config: SharedConfig,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let at = config
            .snapshot()
            .await
            .push
            .daily_report
            .time_of_day()
            .unwrap_or(NaiveTime::MIN);
        let now = Utc::now();
        let next = next_occurrence(now, at, SCHEDULE_TZ);
        tokio::select! {
            _ = sleep(until(next, now)) => {}
            _ = stop.changed() => {
                info!("Report worker: stopped");
                return;
            }
        }

        let enabled = config.snapshot().await.push.daily_report.enabled;
        if enabled {
            match alerts.daily_report().await {
                Ok(outcome) => {
                    info!(reason = outcome.reason(), "Report worker: daily report finished");
                }
                Err(e) => {
                    error!(error = %e, "Report worker: daily report failed");
                }
            }
        }

        if *stop.borrow() {
            info!("Report worker: stopped after report");
            return;
        }
    }
}
