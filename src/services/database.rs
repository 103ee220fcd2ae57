use crate::constants::DB_FILE;
use crate::error::{AppError, Result};
use crate::models::{PriceSnapshot, SnapshotSummary, TrackedGame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Append-only price time series plus the registry of tracked games.
///
/// Single SQLite file under the data directory. WAL journaling lets the
/// retention purge run concurrently with collection writes; each logical
/// operation is one statement or one transaction, never a store-wide lock.
#[derive(Debug)]
pub struct PriceStore {
    pool: SqlitePool,
    database_path: PathBuf,
}

/// Summary row for `GET /api/db-stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub record_count: i64,
    pub game_count: i64,
    pub oldest_record: Option<DateTime<Utc>>,
    pub newest_record: Option<DateTime<Utc>>,
    pub file_size_kb: u64,
}

impl PriceStore {
    /// Open (or create) the database at `<data_dir>/prices.db`.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let database_path = data_dir.join(DB_FILE);
        info!("Initializing price store at: {:?}", database_path);

        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(connect_options).await?;

        let store = Self {
            pool,
            database_path,
        };
        store.initialize_schema().await?;

        info!("Price store initialized");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                history_low_price REAL,
                push_enabled INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id TEXT NOT NULL REFERENCES games(id),
                min_price REAL NOT NULL,
                avg_price REAL NOT NULL,
                max_price REAL NOT NULL,
                stock_count INTEGER NOT NULL,
                seller_count INTEGER NOT NULL,
                recorded_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_game_time \
             ON price_records(game_id, recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a tracked game. Partial-update semantics on conflict: `name` is
    /// always taken from the caller, `history_low_price` only when supplied,
    /// `push_enabled` and `created_at` are preserved. Idempotent per id.
    pub async fn register_game(
        &self,
        id: &str,
        name: &str,
        history_low_price: Option<f64>,
    ) -> Result<TrackedGame> {
        if id.trim().is_empty() {
            return Err(AppError::InvalidInput("game id must not be empty".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO games (id, name, history_low_price, push_enabled, created_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                history_low_price = COALESCE(excluded.history_low_price, games.history_low_price)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(history_low_price)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_game(id)
            .await?
            .ok_or_else(|| AppError::Database(format!("game {} missing after upsert", id)))
    }

    pub async fn list_games(&self) -> Result<Vec<TrackedGame>> {
        let games = sqlx::query_as::<_, TrackedGame>(
            "SELECT id, name, history_low_price, push_enabled, created_at \
             FROM games ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(games)
    }

    pub async fn get_game(&self, id: &str) -> Result<Option<TrackedGame>> {
        let game = sqlx::query_as::<_, TrackedGame>(
            "SELECT id, name, history_low_price, push_enabled, created_at \
             FROM games WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(game)
    }

    /// Delete a game and every one of its snapshots in one transaction.
    /// Returns whether the game existed.
    pub async fn delete_game(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM price_records WHERE game_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM games WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Append one snapshot. `min_price` must be finite; nothing else is
    /// validated — upstream values are recorded as reported.
    pub async fn append_snapshot(
        &self,
        game_id: &str,
        summary: &SnapshotSummary,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        if !summary.min_price.is_finite() {
            return Err(AppError::InvalidSnapshot(format!(
                "min_price {} is not finite",
                summary.min_price
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO price_records
                (game_id, min_price, avg_price, max_price, stock_count, seller_count, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id)
        .bind(summary.min_price)
        .bind(summary.avg_price)
        .bind(summary.max_price)
        .bind(summary.stock_count)
        .bind(summary.seller_count)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Snapshots for a game in non-decreasing `recorded_at` order, optionally
    /// bounded below by a cutoff (exclusive).
    pub async fn snapshots_since(
        &self,
        game_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceSnapshot>> {
        let snapshots = match cutoff {
            Some(cutoff) => {
                sqlx::query_as::<_, PriceSnapshot>(
                    "SELECT id, game_id, min_price, avg_price, max_price, \
                            stock_count, seller_count, recorded_at \
                     FROM price_records \
                     WHERE game_id = ? AND recorded_at > ? \
                     ORDER BY recorded_at, id",
                )
                .bind(game_id)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PriceSnapshot>(
                    "SELECT id, game_id, min_price, avg_price, max_price, \
                            stock_count, seller_count, recorded_at \
                     FROM price_records \
                     WHERE game_id = ? \
                     ORDER BY recorded_at, id",
                )
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(snapshots)
    }

    pub async fn latest_snapshot(&self, game_id: &str) -> Result<Option<PriceSnapshot>> {
        let snapshot = sqlx::query_as::<_, PriceSnapshot>(
            "SELECT id, game_id, min_price, avg_price, max_price, \
                    stock_count, seller_count, recorded_at \
             FROM price_records \
             WHERE game_id = ? \
             ORDER BY recorded_at DESC, id DESC LIMIT 1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snapshot)
    }

    /// Delete snapshots strictly older than `cutoff` across all games.
    /// Returns the number of rows removed.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM price_records WHERE recorded_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn set_history_low(&self, game_id: &str, price: Option<f64>) -> Result<()> {
        if let Some(p) = price {
            if !p.is_finite() || p < 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "history low price {} must be a non-negative number",
                    p
                )));
            }
        }
        let updated = sqlx::query("UPDATE games SET history_low_price = ? WHERE id = ?")
            .bind(price)
            .bind(game_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound(format!("game {}", game_id)));
        }
        Ok(())
    }

    pub async fn set_push_enabled(&self, game_id: &str, enabled: bool) -> Result<()> {
        let updated = sqlx::query("UPDATE games SET push_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(game_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound(format!("game {}", game_id)));
        }
        Ok(())
    }

    pub async fn db_stats(&self) -> Result<DbStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS record_count, \
                    MIN(recorded_at) AS oldest, \
                    MAX(recorded_at) AS newest \
             FROM price_records",
        )
        .fetch_one(&self.pool)
        .await?;
        let record_count: i64 = row.get("record_count");
        let oldest_record: Option<DateTime<Utc>> = row.get("oldest");
        let newest_record: Option<DateTime<Utc>> = row.get("newest");

        let game_count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM games")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let file_size_kb = match tokio::fs::metadata(&self.database_path).await {
            Ok(meta) => meta.len() / 1024,
            Err(_) => 0,
        };

        Ok(DbStats {
            record_count,
            game_count,
            oldest_record,
            newest_record,
            file_size_kb,
        })
    }

    /// Flush and close the pool. Called on shutdown so no durable write is
    /// abandoned mid-flight.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn summary(min: f64) -> SnapshotSummary {
        SnapshotSummary {
            min_price: min,
            avg_price: min + 2.0,
            max_price: min + 5.0,
            stock_count: 10,
            seller_count: 3,
        }
    }

    async fn open_store(dir: &TempDir) -> PriceStore {
        PriceStore::new(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_and_query_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();

        let base = Utc::now() - Duration::hours(4);
        for (i, min) in [10.0, 8.0, 12.0, 6.0].iter().enumerate() {
            store
                .append_snapshot("g1", &summary(*min), base + Duration::hours(i as i64))
                .await
                .unwrap();
        }

        let rows = store.snapshots_since("g1", None).await.unwrap();
        assert_eq!(rows.len(), 4);
        let mins: Vec<f64> = rows.iter().map(|s| s.min_price).collect();
        assert_eq!(mins, vec![10.0, 8.0, 12.0, 6.0]);
        for pair in rows.windows(2) {
            assert!(pair[0].recorded_at <= pair[1].recorded_at);
        }

        let latest = store.latest_snapshot("g1").await.unwrap().unwrap();
        assert_eq!(latest.min_price, 6.0);
    }

    #[tokio::test]
    async fn test_rejects_non_finite_min_price() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();

        let err = store
            .append_snapshot("g1", &summary(f64::NAN), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSnapshot(_)));
    }

    #[tokio::test]
    async fn test_purge_boundary() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();

        let cutoff = Utc::now() - Duration::days(7);
        store
            .append_snapshot("g1", &summary(5.0), cutoff - Duration::seconds(1))
            .await
            .unwrap();
        store
            .append_snapshot("g1", &summary(6.0), cutoff)
            .await
            .unwrap();
        store
            .append_snapshot("g1", &summary(7.0), cutoff + Duration::seconds(1))
            .await
            .unwrap();

        let deleted = store.purge_older_than(cutoff).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.snapshots_since("g1", None).await.unwrap();
        let mins: Vec<f64> = remaining.iter().map(|s| s.min_price).collect();
        // Rows exactly at the cutoff survive.
        assert_eq!(mins, vec![6.0, 7.0]);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();
        store.register_game("g2", "Game Two", None).await.unwrap();
        store
            .append_snapshot("g1", &summary(5.0), Utc::now())
            .await
            .unwrap();
        store
            .append_snapshot("g2", &summary(9.0), Utc::now())
            .await
            .unwrap();

        assert!(store.delete_game("g1").await.unwrap());
        assert!(!store.delete_game("g1").await.unwrap());

        assert!(store.get_game("g1").await.unwrap().is_none());
        assert!(store.snapshots_since("g1", None).await.unwrap().is_empty());
        // Unrelated game untouched.
        assert_eq!(store.snapshots_since("g2", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_partial_update_semantics() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let game = store
            .register_game("g1", "Old Name", Some(19.99))
            .await
            .unwrap();
        assert_eq!(game.history_low_price, Some(19.99));
        store.set_push_enabled("g1", false).await.unwrap();

        // Re-registering without a history low keeps the stored one, and the
        // push setting survives the upsert.
        let game = store.register_game("g1", "New Name", None).await.unwrap();
        assert_eq!(game.name, "New Name");
        assert_eq!(game.history_low_price, Some(19.99));
        assert!(!game.push_enabled);

        // Supplying a history low overwrites it.
        let game = store
            .register_game("g1", "New Name", Some(9.99))
            .await
            .unwrap();
        assert_eq!(game.history_low_price, Some(9.99));
    }

    #[tokio::test]
    async fn test_history_low_roundtrip_and_validation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();

        store.set_history_low("g1", Some(19.99)).await.unwrap();
        let game = store.get_game("g1").await.unwrap().unwrap();
        assert_eq!(game.history_low_price, Some(19.99));

        store.set_history_low("g1", None).await.unwrap();
        let game = store.get_game("g1").await.unwrap().unwrap();
        assert_eq!(game.history_low_price, None);

        assert!(matches!(
            store.set_history_low("missing", Some(1.0)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.set_history_low("g1", Some(f64::INFINITY)).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_db_stats() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.register_game("g1", "Game One", None).await.unwrap();

        let stats = store.db_stats().await.unwrap();
        assert_eq!(stats.record_count, 0);
        assert_eq!(stats.game_count, 1);
        assert!(stats.oldest_record.is_none());

        let now = Utc::now();
        store
            .append_snapshot("g1", &summary(5.0), now - Duration::hours(1))
            .await
            .unwrap();
        store.append_snapshot("g1", &summary(6.0), now).await.unwrap();

        let stats = store.db_stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
        assert!(stats.oldest_record.unwrap() < stats.newest_record.unwrap());
    }
}
