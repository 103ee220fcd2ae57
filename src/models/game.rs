use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace catalog entry whose price history is being recorded.
///
/// `id` is the upstream catalog identifier and the primary key; games are
/// created by explicit registration through the API.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrackedGame {
    pub id: String,
    pub name: String,
    /// Operator-set reference price; a snapshot at or below it fires the
    /// history-low alert. Absent means the rule never fires for this game.
    pub history_low_price: Option<f64>,
    pub push_enabled: bool,
    pub created_at: DateTime<Utc>,
}
