use crate::config::ConfigStore;
use crate::services::{AlertEngine, CollectOutcome, Collector, MarketClient, Notifier, PriceStore};
use crate::utils::get_data_dir;
use std::sync::Arc;

/// One-off collection from the command line, outside the scheduler.
pub async fn run(game_id: Option<String>) {
    let data_dir = get_data_dir();
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
    let collector = Collector::new(store.clone(), market, alerts, config);

    match game_id {
        Some(id) => match collector.collect(&id).await {
            Ok(CollectOutcome::Collected(summary)) => {
                println!(
                    "✅ {}: min ¥{:.2} / avg ¥{:.2} / max ¥{:.2}, {} sellers, {} in stock",
                    id,
                    summary.min_price,
                    summary.avg_price,
                    summary.max_price,
                    summary.seller_count,
                    summary.stock_count
                );
            }
            Ok(CollectOutcome::Empty) => {
                println!("⚠️  {}: no listings right now", id);
            }
            Err(e) => {
                eprintln!("❌ {}: {}", id, e);
                store.close().await;
                std::process::exit(1);
            }
        },
        None => {
            let stats = collector.collect_all().await;
            println!(
                "✅ Cycle finished: {} attempted, {} collected, {} empty, {} failed",
                stats.attempted, stats.collected, stats.empty, stats.failed
            );
        }
    }

    store.close().await;
}
