use crate::config::{PushConfig, SharedConfig};
use crate::error::Result;
use crate::models::{SnapshotSummary, TrackedGame};
use crate::services::database::PriceStore;
use crate::services::notifier::{Notifier, PushReport};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A rule that fired for a new snapshot. One notification carries every
/// reason that fired together.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertReason {
    HistoryLow { threshold: f64, price: f64 },
    PriceDrop { percent: f64, from: f64, to: f64 },
    PriceRise { percent: f64, from: f64, to: f64 },
}

impl AlertReason {
    fn describe(&self) -> String {
        match self {
            AlertReason::HistoryLow { threshold, price } => {
                format!("History low: ¥{:.2} (threshold ¥{:.2})", price, threshold)
            }
            AlertReason::PriceDrop { percent, from, to } => {
                format!("Price drop {:.1}%: ¥{:.2} -> ¥{:.2}", percent.abs(), from, to)
            }
            AlertReason::PriceRise { percent, from, to } => {
                format!("Price rise {:.1}%: ¥{:.2} -> ¥{:.2}", percent, from, to)
            }
        }
    }
}

/// Evaluate the per-snapshot rules in order. Pure over the config snapshot;
/// cooldown handling happens in the engine.
pub fn fired_rules(
    push: &PushConfig,
    game: &TrackedGame,
    min_price: f64,
    previous_min: Option<f64>,
) -> Vec<AlertReason> {
    let mut reasons = Vec::new();

    if push.history_low_alert.enabled {
        if let Some(threshold) = game.history_low_price {
            if min_price <= threshold {
                reasons.push(AlertReason::HistoryLow {
                    threshold,
                    price: min_price,
                });
            }
        }
    }

    if push.price_change_alert.enabled {
        if let Some(previous) = previous_min {
            if previous > 0.0 {
                let percent = (min_price - previous) / previous * 100.0;
                let drop = push.price_change_alert.drop_percent;
                let rise = push.price_change_alert.rise_percent;
                if drop > 0.0 && percent <= -drop {
                    reasons.push(AlertReason::PriceDrop {
                        percent,
                        from: previous,
                        to: min_price,
                    });
                } else if rise > 0.0 && percent >= rise {
                    reasons.push(AlertReason::PriceRise {
                        percent,
                        from: previous,
                        to: min_price,
                    });
                }
            }
        }
    }

    reasons
}

/// Per-game cooldown timers. In-memory only: a restart resets every timer,
/// which can re-alert immediately after a restart.
#[derive(Debug, Default)]
pub struct Cooldowns {
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl Cooldowns {
    /// Whether a send for this game must be dropped at `now`.
    pub fn suppressed(&self, game_id: &str, now: DateTime<Utc>, cooldown_minutes: u32) -> bool {
        match self.last_alert.get(game_id) {
            Some(last) => now - *last < Duration::minutes(i64::from(cooldown_minutes)),
            None => false,
        }
    }

    pub fn arm(&mut self, game_id: &str, now: DateTime<Utc>) {
        self.last_alert.insert(game_id.to_string(), now);
    }
}

/// Outcome of one alert-engine invocation. Reasons stay machine-readable and
/// distinguishable at the API surface.
#[derive(Debug)]
pub enum NotifyOutcome {
    Sent(PushReport),
    Disabled,
    NoEndpoints,
    NotTriggered,
    Suppressed,
    NothingToReport,
}

impl NotifyOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            NotifyOutcome::Sent(_) => "sent",
            NotifyOutcome::Disabled => "disabled",
            NotifyOutcome::NoEndpoints => "no_endpoints",
            NotifyOutcome::NotTriggered => "not_triggered",
            NotifyOutcome::Suppressed => "suppressed",
            NotifyOutcome::NothingToReport => "nothing_to_report",
        }
    }

    /// True only when at least one endpoint accepted the message.
    pub fn delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Sent(report) if report.ok())
    }
}

/// Evaluates new snapshots and collection failures against the configured
/// rules and drives the notifier.
pub struct AlertEngine {
    store: Arc<PriceStore>,
    notifier: Notifier,
    config: SharedConfig,
    cooldowns: Mutex<Cooldowns>,
}

impl AlertEngine {
    pub fn new(store: Arc<PriceStore>, notifier: Notifier, config: SharedConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            cooldowns: Mutex::new(Cooldowns::default()),
        }
    }

    /// Evaluate a freshly written snapshot. Sends at most one combined
    /// notification, honoring the per-game cooldown window.
    pub async fn on_snapshot(
        &self,
        game: &TrackedGame,
        summary: &SnapshotSummary,
        previous_min: Option<f64>,
    ) -> NotifyOutcome {
        let config = self.config.snapshot().await;
        if !config.push.enabled || !game.push_enabled {
            return NotifyOutcome::Disabled;
        }

        let reasons = fired_rules(&config.push, game, summary.min_price, previous_min);
        if reasons.is_empty() {
            return NotifyOutcome::NotTriggered;
        }

        let now = Utc::now();
        {
            let cooldowns = self.cooldowns.lock().await;
            if cooldowns.suppressed(&game.id, now, config.push.cooldown_minutes) {
                debug!(game_id = %game.id, "Alert suppressed by cooldown");
                return NotifyOutcome::Suppressed;
            }
        }

        if config.push.endpoints.is_empty() {
            return NotifyOutcome::NoEndpoints;
        }

        let title = format!("Price alert: {}", game.name);
        let mut lines: Vec<String> = reasons.iter().map(|r| r.describe()).collect();
        lines.push(format!(
            "Now ¥{:.2} (avg ¥{:.2}), {} sellers / {} in stock",
            summary.min_price, summary.avg_price, summary.seller_count, summary.stock_count
        ));
        let report = self
            .notifier
            .notify(&title, &lines.join("\n"), &config.push.endpoints)
            .await;

        self.cooldowns.lock().await.arm(&game.id, now);
        info!(game_id = %game.id, reasons = reasons.len(), "Alert sent");
        NotifyOutcome::Sent(report)
    }

    /// Collection-failure path. Not subject to the per-game cooldown.
    pub async fn on_collect_error(
        &self,
        game_id: &str,
        game_name: &str,
        error: &str,
    ) -> NotifyOutcome {
        let config = self.config.snapshot().await;
        if !config.push.enabled || !config.push.error_alert.enabled {
            return NotifyOutcome::Disabled;
        }
        if config.push.endpoints.is_empty() {
            return NotifyOutcome::NoEndpoints;
        }

        let title = format!("Collection error: {}", game_name);
        let content = format!("Collecting {} failed: {}", game_id, error);
        let report = self
            .notifier
            .notify(&title, &content, &config.push.endpoints)
            .await;
        NotifyOutcome::Sent(report)
    }

    /// Daily summary across all games with data in the last 24 hours.
    /// Zero qualifying games is its own outcome and never reaches the
    /// notifier. Independent of cooldown.
    pub async fn daily_report(&self) -> Result<NotifyOutcome> {
        let config = self.config.snapshot().await;
        if !config.push.enabled {
            return Ok(NotifyOutcome::Disabled);
        }

        let cutoff = Utc::now() - Duration::hours(24);
        let mut blocks = Vec::new();
        for game in self.store.list_games().await? {
            let snapshots = self.store.snapshots_since(&game.id, Some(cutoff)).await?;
            if snapshots.is_empty() {
                continue;
            }
            let low = snapshots.iter().map(|s| s.min_price).fold(f64::INFINITY, f64::min);
            let high = snapshots.iter().map(|s| s.min_price).fold(f64::NEG_INFINITY, f64::max);
            // snapshots are time-ordered, so the last row is the latest.
            let latest = &snapshots[snapshots.len() - 1];
            blocks.push(format!(
                "{}: now ¥{:.2}, 24h low ¥{:.2} / high ¥{:.2}, {} records",
                game.name,
                latest.min_price,
                low,
                high,
                snapshots.len()
            ));
        }

        if blocks.is_empty() {
            info!("Daily report skipped: no game has data in the last 24h");
            return Ok(NotifyOutcome::NothingToReport);
        }
        if config.push.endpoints.is_empty() {
            return Ok(NotifyOutcome::NoEndpoints);
        }

        let report = self
            .notifier
            .notify("Daily price report", &blocks.join("\n"), &config.push.endpoints)
            .await;
        Ok(NotifyOutcome::Sent(report))
    }

    /// Test message, optionally against caller-supplied endpoints that have
    /// not been saved yet. Masked endpoint echoes are ignored.
    pub async fn test_push(&self, endpoints_override: Option<Vec<String>>) -> NotifyOutcome {
        let config = self.config.snapshot().await;
        let endpoints: Vec<String> = match endpoints_override {
            Some(list) if !list.is_empty() => list
                .into_iter()
                .filter(|e| !e.contains(crate::constants::MASK_MARKER))
                .collect(),
            _ => config.push.endpoints.clone(),
        };
        if endpoints.is_empty() {
            return NotifyOutcome::NoEndpoints;
        }

        let report = self
            .notifier
            .notify(
                "keywatch test notification",
                "Push delivery is configured correctly.",
                &endpoints,
            )
            .await;
        NotifyOutcome::Sent(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PriceChangeAlert, RuleToggle};

    fn game(history_low: Option<f64>) -> TrackedGame {
        TrackedGame {
            id: "g1".to_string(),
            name: "Game One".to_string(),
            history_low_price: history_low,
            push_enabled: true,
            created_at: Utc::now(),
        }
    }

    fn push_with_history_low() -> PushConfig {
        PushConfig {
            enabled: true,
            history_low_alert: RuleToggle { enabled: true },
            ..PushConfig::default()
        }
    }

    #[test]
    fn test_history_low_fires_at_or_below_threshold() {
        let push = push_with_history_low();
        let game = game(Some(10.0));

        assert_eq!(fired_rules(&push, &game, 9.0, None).len(), 1);
        assert_eq!(fired_rules(&push, &game, 10.0, None).len(), 1);
        assert!(fired_rules(&push, &game, 10.01, None).is_empty());
    }

    #[test]
    fn test_history_low_needs_threshold_and_toggle() {
        let push = push_with_history_low();
        assert!(fired_rules(&push, &game(None), 1.0, None).is_empty());

        let disabled = PushConfig {
            enabled: true,
            ..PushConfig::default()
        };
        assert!(fired_rules(&disabled, &game(Some(10.0)), 1.0, None).is_empty());
    }

    #[test]
    fn test_price_change_rule() {
        let push = PushConfig {
            enabled: true,
            price_change_alert: PriceChangeAlert {
                enabled: true,
                drop_percent: 10.0,
                rise_percent: 20.0,
            },
            ..PushConfig::default()
        };
        let game = game(None);

        // 20 -> 17 is a 15% drop.
        let reasons = fired_rules(&push, &game, 17.0, Some(20.0));
        assert!(matches!(reasons[0], AlertReason::PriceDrop { .. }));

        // 20 -> 19 is only 5%.
        assert!(fired_rules(&push, &game, 19.0, Some(20.0)).is_empty());

        // 20 -> 25 is a 25% rise.
        let reasons = fired_rules(&push, &game, 25.0, Some(20.0));
        assert!(matches!(reasons[0], AlertReason::PriceRise { .. }));

        // No previous snapshot, no rule.
        assert!(fired_rules(&push, &game, 1.0, None).is_empty());
    }

    #[test]
    fn test_combined_reasons() {
        let push = PushConfig {
            enabled: true,
            history_low_alert: RuleToggle { enabled: true },
            price_change_alert: PriceChangeAlert {
                enabled: true,
                drop_percent: 10.0,
                rise_percent: 0.0,
            },
            ..PushConfig::default()
        };
        let reasons = fired_rules(&push, &game(Some(10.0)), 8.0, Some(20.0));
        assert_eq!(reasons.len(), 2);
    }

    #[tokio::test]
    async fn test_daily_report_outcomes() {
        use crate::models::SnapshotSummary;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(crate::constants::CONFIG_FILE),
            r#"{"push": {"enabled": true}}"#,
        )
        .unwrap();

        let store = Arc::new(PriceStore::new(dir.path()).await.unwrap());
        let config = Arc::new(crate::config::ConfigStore::load(dir.path()));
        let engine = AlertEngine::new(store.clone(), Notifier::new().unwrap(), config);

        // No games at all: distinct "nothing to report", notifier untouched.
        let outcome = engine.daily_report().await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::NothingToReport));

        // A game whose only snapshot is older than 24h does not qualify.
        store.register_game("g1", "Game One", None).await.unwrap();
        let stale = SnapshotSummary {
            min_price: 9.0,
            avg_price: 10.0,
            max_price: 11.0,
            stock_count: 2,
            seller_count: 1,
        };
        store
            .append_snapshot("g1", &stale, Utc::now() - Duration::hours(25))
            .await
            .unwrap();
        let outcome = engine.daily_report().await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::NothingToReport));

        // Fresh data but zero configured endpoints is its own reason.
        store
            .append_snapshot("g1", &stale, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        let outcome = engine.daily_report().await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::NoEndpoints));
        assert_eq!(outcome.reason(), "no_endpoints");
    }

    #[tokio::test]
    async fn test_daily_report_disabled_globally() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(PriceStore::new(dir.path()).await.unwrap());
        let config = Arc::new(crate::config::ConfigStore::load(dir.path()));
        let engine = AlertEngine::new(store, Notifier::new().unwrap(), config);

        let outcome = engine.daily_report().await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Disabled));
    }

    #[test]
    fn test_cooldown_window() {
        let mut cooldowns = Cooldowns::default();
        let start = Utc::now();

        // First alert goes through, then arms the timer.
        assert!(!cooldowns.suppressed("g1", start, 60));
        cooldowns.arm("g1", start);

        // Within the window: dropped, not deferred.
        assert!(cooldowns.suppressed("g1", start + Duration::minutes(59), 60));
        // A different game has its own timer.
        assert!(!cooldowns.suppressed("g2", start + Duration::minutes(59), 60));
        // After the window elapses the next alert may fire.
        assert!(!cooldowns.suppressed("g1", start + Duration::minutes(60), 60));
    }
}
