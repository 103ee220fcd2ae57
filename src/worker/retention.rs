use super::{next_occurrence, until};
use crate::config::SharedConfig;
use crate::constants::SCHEDULE_TZ;
use crate::services::PriceStore;
use chrono::{Duration, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, instrument};

/// Retention loop: once per day at local midnight, drop snapshots older
/// than the configured retention window. The window is read at fire time so
/// config changes apply without a job restart.
#[instrument(skip(store, config, stop))]
pub(super) async fn run(
    store: Arc<PriceStore>,
    config: SharedConfig,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let next = next_occurrence(now, NaiveTime::MIN, SCHEDULE_TZ);
        tokio::select! {
            _ = sleep(until(next, now)) => {}
            _ = stop.changed() => {
                info!("Retention worker: stopped");
                return;
            }
        }

        let retention_days = config.snapshot().await.data_retention_days;
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        match store.purge_older_than(cutoff).await {
            Ok(deleted) => {
                info!(retention_days, deleted, "Retention worker: purge finished");
            }
            Err(e) => {
                error!(error = %e, "Retention worker: purge failed");
            }
        }

        if *stop.borrow() {
            info!("Retention worker: stopped after purge");
            return;
        }
    }
}
