use crate::config::SharedConfig;
use crate::services::Collector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, instrument};

/// Collection loop: sleep the configured interval, then collect every
/// registered game sequentially. A cycle always runs to completion before
/// the next sleep, so the job cannot overlap itself.
#[instrument(skip(collector, config, stop))]
pub(super) async fn run(
    collector: Arc<Collector>,
    config: SharedConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut iteration = 0u64;

    loop {
        let interval_minutes = config.snapshot().await.collect_interval_minutes;
        tokio::select! {
            _ = sleep(Duration::from_secs(u64::from(interval_minutes) * 60)) => {}
            _ = stop.changed() => {
                info!("Collection worker: stopped");
                return;
            }
        }

        iteration += 1;
        info!(iteration, interval_minutes, "Collection worker: starting cycle");
        let stats = collector.collect_all().await;
        info!(
            iteration,
            collected = stats.collected,
            empty = stats.empty,
            failed = stats.failed,
            "Collection worker: cycle finished"
        );

        if *stop.borrow() {
            info!("Collection worker: stopped after cycle");
            return;
        }
    }
}
