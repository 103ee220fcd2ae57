use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time summary of a game's market listings.
///
/// Immutable once written; rows are only removed by retention cleanup or by
/// cascade when the game is deleted. The store does not enforce any ordering
/// between `min_price`, `avg_price` and `max_price` — values are recorded as
/// the upstream reported them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub id: i64,
    pub game_id: String,
    pub min_price: f64,
    pub avg_price: f64,
    pub max_price: f64,
    pub stock_count: i64,
    pub seller_count: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Reduction of one listing page, before it is persisted.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub min_price: f64,
    pub avg_price: f64,
    pub max_price: f64,
    pub stock_count: i64,
    pub seller_count: i64,
}
