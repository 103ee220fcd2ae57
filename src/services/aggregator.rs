use crate::error::Result;
use crate::models::{Period, PriceSnapshot};
use crate::services::database::PriceStore;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Window statistics over a game's snapshots. `None` at the call sites means
/// "no data in the window", which is distinct from zero-valued data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceStats {
    /// Lowest observed minimum price in the window.
    pub lowest: f64,
    /// Highest observed minimum price in the window.
    pub highest: f64,
    pub avg_min: f64,
    pub avg_of_avg: f64,
    pub count: usize,
    pub first_record: DateTime<Utc>,
    pub last_record: DateTime<Utc>,
}

/// Rollup resolutions and their fixed lookback windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Resolution {
    pub fn window(&self) -> Duration {
        match self {
            Resolution::Hourly => Duration::days(1),
            Resolution::Daily => Duration::days(30),
            Resolution::Weekly => Duration::days(84),
            Resolution::Monthly => Duration::days(365),
        }
    }

    /// Bucket label for a timestamp. Labels sort lexicographically in time
    /// order, so the BTreeMap grouping comes out bucket-ascending.
    pub fn bucket_label(&self, ts: DateTime<Utc>) -> String {
        match self {
            Resolution::Hourly => format!(
                "{:04}-{:02}-{:02} {:02}:00",
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour()
            ),
            Resolution::Daily => ts.format("%Y-%m-%d").to_string(),
            Resolution::Weekly => ts.format("%Y-W%W").to_string(),
            Resolution::Monthly => ts.format("%Y-%m").to_string(),
        }
    }
}

/// One time bucket of a rollup. `avg_stock` is only reported at daily
/// resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupBucket {
    pub bucket_label: String,
    pub avg_min: f64,
    pub min: f64,
    pub max: f64,
    pub avg_sellers: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_stock: Option<f64>,
}

/// Price-distribution band with a half-open range.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBand {
    pub range: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volatility {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub count: usize,
}

/// Everything `GET /api/analysis/:id` returns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub hourly: Vec<RollupBucket>,
    pub daily: Vec<RollupBucket>,
    pub weekly: Vec<RollupBucket>,
    pub monthly: Vec<RollupBucket>,
    pub distribution: Vec<HistogramBand>,
    pub volatility: Option<Volatility>,
}

/// Compute window stats over time-ordered snapshots. `None` when empty.
pub fn compute_stats(snapshots: &[PriceSnapshot]) -> Option<PriceStats> {
    if snapshots.is_empty() {
        return None;
    }

    let mut lowest = f64::INFINITY;
    let mut highest = f64::NEG_INFINITY;
    let mut min_sum = 0.0;
    let mut avg_sum = 0.0;
    for snapshot in snapshots {
        lowest = lowest.min(snapshot.min_price);
        highest = highest.max(snapshot.min_price);
        min_sum += snapshot.min_price;
        avg_sum += snapshot.avg_price;
    }
    let count = snapshots.len();

    Some(PriceStats {
        lowest,
        highest,
        avg_min: min_sum / count as f64,
        avg_of_avg: avg_sum / count as f64,
        count,
        first_record: snapshots[0].recorded_at,
        last_record: snapshots[count - 1].recorded_at,
    })
}

/// Group snapshots into fixed-width buckets and aggregate each.
pub fn compute_rollup(snapshots: &[PriceSnapshot], resolution: Resolution) -> Vec<RollupBucket> {
    let mut buckets: BTreeMap<String, Vec<&PriceSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        buckets
            .entry(resolution.bucket_label(snapshot.recorded_at))
            .or_default()
            .push(snapshot);
    }

    buckets
        .into_iter()
        .map(|(bucket_label, rows)| {
            let count = rows.len() as f64;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut min_sum = 0.0;
            let mut seller_sum = 0.0;
            let mut stock_sum = 0.0;
            for row in &rows {
                min = min.min(row.min_price);
                max = max.max(row.min_price);
                min_sum += row.min_price;
                seller_sum += row.seller_count as f64;
                stock_sum += row.stock_count as f64;
            }
            RollupBucket {
                bucket_label,
                avg_min: min_sum / count,
                min,
                max,
                avg_sellers: seller_sum / count,
                avg_stock: (resolution == Resolution::Daily).then_some(stock_sum / count),
            }
        })
        .collect()
}

/// Fixed half-open price bands: [0,5) [5,10) [10,20) [20,50) [50,∞).
pub fn compute_histogram(snapshots: &[PriceSnapshot]) -> Vec<HistogramBand> {
    const BANDS: [(&str, f64, f64); 5] = [
        ("0-5", 0.0, 5.0),
        ("5-10", 5.0, 10.0),
        ("10-20", 10.0, 20.0),
        ("20-50", 20.0, 50.0),
        ("50+", 50.0, f64::INFINITY),
    ];

    BANDS
        .iter()
        .map(|(range, lower, upper)| HistogramBand {
            range,
            count: snapshots
                .iter()
                .filter(|s| s.min_price >= *lower && s.min_price < *upper)
                .count(),
        })
        .collect()
}

pub fn compute_volatility(snapshots: &[PriceSnapshot]) -> Option<Volatility> {
    if snapshots.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for snapshot in snapshots {
        min = min.min(snapshot.min_price);
        max = max.max(snapshot.min_price);
        sum += snapshot.min_price;
    }

    Some(Volatility {
        mean: sum / snapshots.len() as f64,
        min,
        max,
        range: max - min,
        count: snapshots.len(),
    })
}

/// Read-only aggregation over the price store.
pub struct Aggregator {
    store: Arc<PriceStore>,
}

impl Aggregator {
    pub fn new(store: Arc<PriceStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self, game_id: &str, period: Period) -> Result<Option<PriceStats>> {
        let snapshots = self
            .store
            .snapshots_since(game_id, period.cutoff(Utc::now()))
            .await?;
        Ok(compute_stats(&snapshots))
    }

    pub async fn rollup(&self, game_id: &str, resolution: Resolution) -> Result<Vec<RollupBucket>> {
        let cutoff = Utc::now() - resolution.window();
        let snapshots = self.store.snapshots_since(game_id, Some(cutoff)).await?;
        Ok(compute_rollup(&snapshots, resolution))
    }

    pub async fn analysis(&self, game_id: &str) -> Result<AnalysisReport> {
        let hourly = self.rollup(game_id, Resolution::Hourly).await?;
        let daily = self.rollup(game_id, Resolution::Daily).await?;
        let weekly = self.rollup(game_id, Resolution::Weekly).await?;
        let monthly = self.rollup(game_id, Resolution::Monthly).await?;

        let all_time = self.store.snapshots_since(game_id, None).await?;
        Ok(AnalysisReport {
            hourly,
            daily,
            weekly,
            monthly,
            distribution: compute_histogram(&all_time),
            volatility: compute_volatility(&all_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(min: f64, recorded_at: DateTime<Utc>) -> PriceSnapshot {
        PriceSnapshot {
            id: 0,
            game_id: "g1".to_string(),
            min_price: min,
            avg_price: min + 1.0,
            max_price: min + 2.0,
            stock_count: 4,
            seller_count: 2,
            recorded_at,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_stats_lowest_and_highest() {
        let rows: Vec<PriceSnapshot> = [10.0, 8.0, 12.0, 6.0]
            .iter()
            .enumerate()
            .map(|(i, min)| snapshot(*min, at(i as u32, 0)))
            .collect();
        let stats = compute_stats(&rows).unwrap();
        assert_eq!(stats.lowest, 6.0);
        assert_eq!(stats.highest, 12.0);
        assert_eq!(stats.avg_min, 9.0);
        assert_eq!(stats.avg_of_avg, 10.0);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.first_record, at(0, 0));
        assert_eq!(stats.last_record, at(3, 0));
    }

    #[test]
    fn test_stats_empty_window_is_none() {
        assert!(compute_stats(&[]).is_none());
        assert!(compute_volatility(&[]).is_none());
    }

    #[test]
    fn test_hourly_rollup_groups_by_hour() {
        let rows = vec![
            snapshot(10.0, at(9, 5)),
            snapshot(8.0, at(9, 45)),
            snapshot(12.0, at(10, 15)),
        ];
        let buckets = compute_rollup(&rows, Resolution::Hourly);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_label, "2025-06-15 09:00");
        assert_eq!(buckets[0].avg_min, 9.0);
        assert_eq!(buckets[0].min, 8.0);
        assert_eq!(buckets[0].max, 10.0);
        assert_eq!(buckets[0].avg_sellers, 2.0);
        assert!(buckets[0].avg_stock.is_none());
        assert_eq!(buckets[1].bucket_label, "2025-06-15 10:00");
    }

    #[test]
    fn test_daily_rollup_reports_stock() {
        let rows = vec![snapshot(10.0, at(9, 0)), snapshot(8.0, at(21, 0))];
        let buckets = compute_rollup(&rows, Resolution::Daily);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bucket_label, "2025-06-15");
        assert_eq!(buckets[0].avg_stock, Some(4.0));
    }

    #[test]
    fn test_monthly_label() {
        let buckets = compute_rollup(&[snapshot(10.0, at(12, 0))], Resolution::Monthly);
        assert_eq!(buckets[0].bucket_label, "2025-06");
    }

    #[test]
    fn test_histogram_half_open_bands() {
        let rows = vec![
            snapshot(0.0, at(1, 0)),
            snapshot(4.99, at(2, 0)),
            snapshot(5.0, at(3, 0)), // lands in [5,10), not [0,5)
            snapshot(19.99, at(4, 0)),
            snapshot(20.0, at(5, 0)),
            snapshot(50.0, at(6, 0)),
            snapshot(120.0, at(7, 0)),
        ];
        let bands = compute_histogram(&rows);
        let counts: Vec<usize> = bands.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1, 1, 1, 2]);
        assert_eq!(bands[1].range, "5-10");
    }

    #[test]
    fn test_volatility_range() {
        let rows = vec![
            snapshot(6.0, at(1, 0)),
            snapshot(12.0, at(2, 0)),
            snapshot(9.0, at(3, 0)),
        ];
        let vol = compute_volatility(&rows).unwrap();
        assert_eq!(vol.min, 6.0);
        assert_eq!(vol.max, 12.0);
        assert_eq!(vol.range, 6.0);
        assert_eq!(vol.mean, 9.0);
        assert_eq!(vol.count, 3);
    }
}
