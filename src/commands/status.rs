use crate::config::ConfigStore;
use crate::services::PriceStore;
use crate::utils::get_data_dir;

pub async fn run() {
    let data_dir = get_data_dir();
    println!("📁 Data directory: {}", data_dir.display());

    let config = ConfigStore::load(&data_dir);
    let snapshot = config.snapshot().await;
    println!("⏰ Collection interval: {} minutes", snapshot.collect_interval_minutes);
    println!("🗄️  Retention: {} days", snapshot.data_retention_days);
    println!(
        "🔔 Push: {} ({} endpoint(s))",
        if snapshot.push.enabled { "enabled" } else { "disabled" },
        snapshot.push.endpoints.len()
    );

    let store = match PriceStore::new(&data_dir).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Failed to open price store: {}", e);
            std::process::exit(1);
        }
    };

    match store.db_stats().await {
        Ok(stats) => {
            println!("🎮 Tracked games:  {}", stats.game_count);
            println!("📈 Price records:  {}", stats.record_count);
            println!("💾 Database size:  {} KB", stats.file_size_kb);
            match (stats.oldest_record, stats.newest_record) {
                (Some(oldest), Some(newest)) => {
                    println!("📅 Oldest record:  {}", oldest.to_rfc3339());
                    println!("📅 Newest record:  {}", newest.to_rfc3339());
                }
                _ => println!("📅 No records yet"),
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to read store stats: {}", e);
        }
    }

    store.close().await;
}
