use crate::config::SharedConfig;
use crate::error::{AppError, Result};
use crate::models::SnapshotSummary;
use crate::services::alerts::AlertEngine;
use crate::services::database::PriceStore;
use crate::services::market_api::{MarketClient, SaleListing};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of one collection attempt. `Empty` is the upstream answering with
/// nothing for sale — a no-op, not a failure.
#[derive(Debug)]
pub enum CollectOutcome {
    Collected(SnapshotSummary),
    Empty,
}

/// Counters for one full collection cycle over all registered games.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStats {
    pub attempted: usize,
    pub collected: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Reduce one listing page to its snapshot summary. `None` on an empty page.
pub fn reduce_listings(listings: &[SaleListing]) -> Option<SnapshotSummary> {
    if listings.is_empty() {
        return None;
    }

    let mut min_price = f64::INFINITY;
    let mut max_price = f64::NEG_INFINITY;
    let mut price_sum = 0.0;
    let mut stock_count = 0i64;
    for listing in listings {
        min_price = min_price.min(listing.key_price);
        max_price = max_price.max(listing.key_price);
        price_sum += listing.key_price;
        stock_count += listing.stock;
    }

    Some(SnapshotSummary {
        min_price,
        avg_price: price_sum / listings.len() as f64,
        max_price,
        stock_count,
        seller_count: listings.len() as i64,
    })
}

/// Fetches current listings for a tracked game, writes the reduced snapshot,
/// and hands the result to the alert engine.
pub struct Collector {
    store: Arc<PriceStore>,
    market: MarketClient,
    alerts: Arc<AlertEngine>,
    config: SharedConfig,
    /// Per-game write serialization: concurrent collects for the same game
    /// (scheduled cycle vs. manual trigger) queue up; different games run
    /// independently.
    game_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Collector {
    pub fn new(
        store: Arc<PriceStore>,
        market: MarketClient,
        alerts: Arc<AlertEngine>,
        config: SharedConfig,
    ) -> Self {
        Self {
            store,
            market,
            alerts,
            config,
            game_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn game_lock(&self, game_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.game_locks.lock().await;
        locks
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Collect one game. On success the snapshot is durably written before
    /// the alert engine runs. A collection error (network/timeout/parse)
    /// takes the error-alert path and writes nothing; no automatic retry —
    /// the next scheduled tick is the retry.
    pub async fn collect(&self, game_id: &str) -> Result<CollectOutcome> {
        let game = self
            .store
            .get_game(game_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("game {}", game_id)))?;

        let lock = self.game_lock(game_id).await;
        let _guard = lock.lock().await;

        let config = self.config.snapshot().await;
        info!(game_id, name = %game.name, "Collecting listings");

        match self.market.fetch_listings(&config, game_id).await {
            Ok(listings) => {
                let summary = match reduce_listings(&listings) {
                    Some(summary) => summary,
                    None => return Ok(CollectOutcome::Empty),
                };
                let previous_min = self
                    .store
                    .latest_snapshot(game_id)
                    .await?
                    .map(|s| s.min_price);
                self.store
                    .append_snapshot(game_id, &summary, Utc::now())
                    .await?;
                info!(
                    game_id,
                    min_price = summary.min_price,
                    sellers = summary.seller_count,
                    stock = summary.stock_count,
                    "Snapshot recorded"
                );
                self.alerts.on_snapshot(&game, &summary, previous_min).await;
                Ok(CollectOutcome::Collected(summary))
            }
            Err(e) if e.is_collection_error() => {
                warn!(game_id, error = %e, "Collection failed");
                self.alerts
                    .on_collect_error(game_id, &game.name, &e.to_string())
                    .await;
                Err(AppError::Network(e.to_string()))
            }
            Err(e) => {
                info!(game_id, reason = %e, "No usable listings");
                Ok(CollectOutcome::Empty)
            }
        }
    }

    /// Collect every registered game sequentially. A failing game never
    /// prevents the rest of the cycle.
    pub async fn collect_all(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        let games = match self.store.list_games().await {
            Ok(games) => games,
            Err(e) => {
                warn!(error = %e, "Could not list games for collection cycle");
                return stats;
            }
        };

        for game in games {
            stats.attempted += 1;
            match self.collect(&game.id).await {
                Ok(CollectOutcome::Collected(_)) => stats.collected += 1,
                Ok(CollectOutcome::Empty) => stats.empty += 1,
                Err(e) => {
                    warn!(game_id = %game.id, error = %e, "Game skipped in cycle");
                    stats.failed += 1;
                }
            }
        }

        info!(
            attempted = stats.attempted,
            collected = stats.collected,
            empty = stats.empty,
            failed = stats.failed,
            "Collection cycle finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: f64, stock: i64) -> SaleListing {
        SaleListing {
            key_price: price,
            stock,
        }
    }

    #[test]
    fn test_reduce_listings() {
        let listings = vec![listing(9.9, 1), listing(12.5, 3), listing(10.0, 2)];
        let summary = reduce_listings(&listings).unwrap();
        assert_eq!(summary.min_price, 9.9);
        assert_eq!(summary.max_price, 12.5);
        assert!((summary.avg_price - 10.8).abs() < 1e-9);
        assert_eq!(summary.seller_count, 3);
        assert_eq!(summary.stock_count, 6);
    }

    #[test]
    fn test_reduce_single_listing() {
        let summary = reduce_listings(&[listing(5.0, 7)]).unwrap();
        assert_eq!(summary.min_price, 5.0);
        assert_eq!(summary.max_price, 5.0);
        assert_eq!(summary.avg_price, 5.0);
        assert_eq!(summary.seller_count, 1);
        assert_eq!(summary.stock_count, 7);
    }

    #[test]
    fn test_reduce_empty_page() {
        assert!(reduce_listings(&[]).is_none());
    }
}
