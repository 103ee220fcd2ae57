use crate::config::ConfigStore;
use crate::server::{self, AppState};
use crate::services::{Aggregator, AlertEngine, Collector, MarketClient, Notifier, PriceStore};
use crate::utils::get_data_dir;
use crate::worker::Scheduler;
use std::sync::Arc;

pub async fn run(port: u16) {
    println!("🎮 Starting keywatch server on port {}", port);

    let data_dir = get_data_dir();
    println!("📁 Data directory: {}", data_dir.display());

    let config = Arc::new(ConfigStore::load(&data_dir));

    let store = match PriceStore::new(&data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("❌ Failed to open price store: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = match Notifier::new() {
        Ok(notifier) => notifier,
        Err(e) => {
            eprintln!("❌ Failed to build notification client: {}", e);
            std::process::exit(1);
        }
    };
    let market = match MarketClient::new() {
        Ok(market) => market,
        Err(e) => {
            eprintln!("❌ Failed to build catalog client: {}", e);
            std::process::exit(1);
        }
    };

    let alerts = Arc::new(AlertEngine::new(store.clone(), notifier, config.clone()));
    let collector = Arc::new(Collector::new(
        store.clone(),
        market,
        alerts.clone(),
        config.clone(),
    ));
    let aggregator = Arc::new(Aggregator::new(store.clone()));
    let scheduler = Scheduler::new(
        store.clone(),
        collector.clone(),
        alerts.clone(),
        config.clone(),
    );
    scheduler.start().await;

    {
        let snapshot = config.snapshot().await;
        println!(
            "⏰ Collecting every {} minutes | retaining {} days",
            snapshot.collect_interval_minutes, snapshot.data_retention_days
        );
        if snapshot.push.enabled {
            println!(
                "🔔 Push enabled: {} endpoint(s), cooldown {} minutes",
                snapshot.push.endpoints.len(),
                snapshot.push.cooldown_minutes
            );
        }
    }

    let state = AppState {
        store: store.clone(),
        config,
        collector,
        aggregator,
        alerts,
        scheduler: scheduler.clone(),
    };

    if let Err(e) = server::serve(state, port).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }

    // Graceful drain: stop the jobs, then flush the store.
    scheduler.shutdown().await;
    store.close().await;
    println!("👋 Shutdown complete");
}
