use crate::constants::{CONFIG_FILE, MASK_MARKER, MASK_VISIBLE_SUFFIX};
use crate::error::Result;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Process-wide configuration, JSON-file backed.
///
/// Handlers and workers never hold this directly; they take an immutable
/// `Arc<AppConfig>` snapshot from [`ConfigStore`] and the store swaps in a new
/// snapshot when a PUT applies. Unknown fields in the file are ignored so the
/// config survives version skew.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Upstream catalog access token, sent as a header on every fetch.
    pub access_token: String,
    pub collect_interval_minutes: u32,
    pub data_retention_days: u32,
    pub api_host: String,
    pub api_path: String,
    pub push: PushConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            collect_interval_minutes: 10,
            data_retention_days: 365,
            api_host: "steampy.com".to_string(),
            api_path: "/xboot/steamKeySale/listSale".to_string(),
            push: PushConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Webhook delivery targets. Opaque to the alert engine; masked on read.
    pub endpoints: Vec<String>,
    pub cooldown_minutes: u32,
    pub history_low_alert: RuleToggle,
    pub price_change_alert: PriceChangeAlert,
    pub daily_report: DailyReport,
    pub error_alert: RuleToggle,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoints: Vec::new(),
            cooldown_minutes: 60,
            history_low_alert: RuleToggle { enabled: false },
            price_change_alert: PriceChangeAlert::default(),
            daily_report: DailyReport::default(),
            // Collection failures are worth knowing about out of the box.
            error_alert: RuleToggle { enabled: true },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleToggle {
    pub enabled: bool,
}

/// Percent-move rule relative to the previous snapshot's minimum price.
/// A threshold of zero disables that direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceChangeAlert {
    pub enabled: bool,
    pub drop_percent: f64,
    pub rise_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyReport {
    pub enabled: bool,
    /// Local time of day (HH:MM) in the fixed schedule time zone.
    pub time: String,
}

impl Default for DailyReport {
    fn default() -> Self {
        Self {
            enabled: false,
            time: "20:00".to_string(),
        }
    }
}

impl DailyReport {
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").ok()
    }
}

/// Inbound PUT body: every field optional, validated field-by-field.
/// Independently-valid fields are applied even when siblings are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub access_token: Option<String>,
    pub collect_interval_minutes: Option<u32>,
    pub data_retention_days: Option<u32>,
    pub api_host: Option<String>,
    pub api_path: Option<String>,
    pub push: Option<PushPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushPatch {
    pub enabled: Option<bool>,
    pub endpoints: Option<Vec<String>>,
    pub cooldown_minutes: Option<u32>,
    pub history_low_alert: Option<RuleTogglePatch>,
    pub price_change_alert: Option<PriceChangeAlertPatch>,
    pub daily_report: Option<DailyReportPatch>,
    pub error_alert: Option<RuleTogglePatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleTogglePatch {
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceChangeAlertPatch {
    pub enabled: Option<bool>,
    pub drop_percent: Option<f64>,
    pub rise_percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyReportPatch {
    pub enabled: Option<bool>,
    pub time: Option<String>,
}

/// What a patch did: which fields were taken, which were refused and why,
/// and which scheduler jobs must be torn down and recreated.
#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub rejected: Vec<String>,
    #[serde(skip)]
    pub restart_collection: bool,
    #[serde(skip)]
    pub restart_report: bool,
}

/// Apply a patch to a config value. Pure; persistence and snapshot swap
/// happen in [`ConfigStore::apply`].
pub fn apply_patch(config: &mut AppConfig, patch: ConfigPatch) -> ApplyReport {
    let mut report = ApplyReport::default();

    if let Some(token) = patch.access_token {
        if token.contains(MASK_MARKER) {
            report
                .rejected
                .push("accessToken: masked value not accepted".to_string());
        } else if token.len() <= 10 {
            report.rejected.push("accessToken: too short".to_string());
        } else {
            config.access_token = token;
            report.applied.push("accessToken".to_string());
        }
    }

    if let Some(interval) = patch.collect_interval_minutes {
        if (1..=1440).contains(&interval) {
            if config.collect_interval_minutes != interval {
                report.restart_collection = true;
            }
            config.collect_interval_minutes = interval;
            report.applied.push("collectIntervalMinutes".to_string());
        } else {
            report.rejected.push(format!(
                "collectIntervalMinutes: {} out of range 1-1440",
                interval
            ));
        }
    }

    if let Some(retention) = patch.data_retention_days {
        if (1..=365).contains(&retention) {
            config.data_retention_days = retention;
            report.applied.push("dataRetentionDays".to_string());
        } else {
            report.rejected.push(format!(
                "dataRetentionDays: {} out of range 1-365",
                retention
            ));
        }
    }

    if let Some(host) = patch.api_host {
        if host.trim().is_empty() {
            report.rejected.push("apiHost: empty".to_string());
        } else {
            config.api_host = host.trim().to_string();
            report.applied.push("apiHost".to_string());
        }
    }

    if let Some(path) = patch.api_path {
        if path.starts_with('/') {
            config.api_path = path;
            report.applied.push("apiPath".to_string());
        } else {
            report
                .rejected
                .push("apiPath: must start with '/'".to_string());
        }
    }

    if let Some(push) = patch.push {
        apply_push_patch(&mut config.push, push, &mut report);
    }

    report
}

fn apply_push_patch(push: &mut PushConfig, patch: PushPatch, report: &mut ApplyReport) {
    if let Some(enabled) = patch.enabled {
        push.enabled = enabled;
        report.applied.push("push.enabled".to_string());
    }

    if let Some(endpoints) = patch.endpoints {
        // The list replaces wholesale; masked echoes of previously configured
        // endpoints are refused individually, the rest are taken.
        let mut accepted = Vec::new();
        for endpoint in endpoints {
            let endpoint = endpoint.trim().to_string();
            if endpoint.is_empty() {
                continue;
            }
            if endpoint.contains(MASK_MARKER) {
                report
                    .rejected
                    .push("push.endpoints: masked value not accepted".to_string());
            } else {
                accepted.push(endpoint);
            }
        }
        push.endpoints = accepted;
        report.applied.push("push.endpoints".to_string());
    }

    if let Some(cooldown) = patch.cooldown_minutes {
        push.cooldown_minutes = cooldown;
        report.applied.push("push.cooldownMinutes".to_string());
    }

    if let Some(toggle) = patch.history_low_alert {
        if let Some(enabled) = toggle.enabled {
            push.history_low_alert.enabled = enabled;
            report.applied.push("push.historyLowAlert".to_string());
        }
    }

    if let Some(change) = patch.price_change_alert {
        if let Some(enabled) = change.enabled {
            push.price_change_alert.enabled = enabled;
            report.applied.push("push.priceChangeAlert.enabled".to_string());
        }
        if let Some(drop) = change.drop_percent {
            if drop.is_finite() && drop >= 0.0 {
                push.price_change_alert.drop_percent = drop;
                report
                    .applied
                    .push("push.priceChangeAlert.dropPercent".to_string());
            } else {
                report
                    .rejected
                    .push("push.priceChangeAlert.dropPercent: must be >= 0".to_string());
            }
        }
        if let Some(rise) = change.rise_percent {
            if rise.is_finite() && rise >= 0.0 {
                push.price_change_alert.rise_percent = rise;
                report
                    .applied
                    .push("push.priceChangeAlert.risePercent".to_string());
            } else {
                report
                    .rejected
                    .push("push.priceChangeAlert.risePercent: must be >= 0".to_string());
            }
        }
    }

    if let Some(daily) = patch.daily_report {
        if let Some(enabled) = daily.enabled {
            push.daily_report.enabled = enabled;
            report.applied.push("push.dailyReport.enabled".to_string());
        }
        if let Some(time) = daily.time {
            if NaiveTime::parse_from_str(&time, "%H:%M").is_ok() {
                if push.daily_report.time != time {
                    report.restart_report = true;
                }
                push.daily_report.time = time;
                report.applied.push("push.dailyReport.time".to_string());
            } else {
                report
                    .rejected
                    .push(format!("push.dailyReport.time: '{}' is not HH:MM", time));
            }
        }
    }

    if let Some(toggle) = patch.error_alert {
        if let Some(enabled) = toggle.enabled {
            push.error_alert.enabled = enabled;
            report.applied.push("push.errorAlert".to_string());
        }
    }
}

/// Display-only transform: `***` plus the trailing characters of a secret.
/// Applied at the API boundary; masked forms are never stored.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    let keep = chars.len().min(MASK_VISIBLE_SUFFIX);
    let suffix: String = chars[chars.len() - keep..].iter().collect();
    format!("{}{}", MASK_MARKER, suffix)
}

/// Holder of the current configuration snapshot.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<AppConfig>>,
}

pub type SharedConfig = Arc<ConfigStore>;

impl ConfigStore {
    /// Load from `<data_dir>/config.json`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<AppConfig>(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
                    AppConfig::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "No config file, using defaults");
                AppConfig::default()
            }
        };
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current immutable snapshot. Cheap; callers keep the `Arc` for the
    /// duration of one logical operation.
    pub async fn snapshot(&self) -> Arc<AppConfig> {
        self.current.read().await.clone()
    }

    /// Validate and apply a patch, persist the result, and swap the snapshot.
    /// Rejected fields are reported, not fatal; nothing is persisted when no
    /// field applied.
    pub async fn apply(&self, patch: ConfigPatch) -> Result<ApplyReport> {
        let mut updated = (*self.snapshot().await).clone();
        let report = apply_patch(&mut updated, patch);
        if !report.applied.is_empty() {
            self.persist(&updated)?;
            *self.current.write().await = Arc::new(updated);
            info!(applied = ?report.applied, rejected = ?report.rejected, "Configuration updated");
        }
        Ok(report)
    }

    /// Snapshot with secrets masked for display. Never fed back into `apply`.
    pub async fn redacted(&self) -> AppConfig {
        let mut config = (*self.snapshot().await).clone();
        config.access_token = mask_secret(&config.access_token);
        config.push.endpoints = config
            .push
            .endpoints
            .iter()
            .map(|e| mask_secret(e))
            .collect();
        config
    }

    fn persist(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.collect_interval_minutes, 10);
        assert_eq!(config.data_retention_days, 365);
        assert_eq!(config.push.cooldown_minutes, 60);
        assert!(config.push.error_alert.enabled);
        assert!(!config.push.enabled);
        assert_eq!(config.push.daily_report.time, "20:00");
    }

    #[test]
    fn test_partial_update_applies_valid_subset() {
        let mut config = AppConfig::default();
        let patch = ConfigPatch {
            collect_interval_minutes: Some(5000), // out of range
            data_retention_days: Some(30),        // fine
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert_eq!(config.collect_interval_minutes, 10);
        assert_eq!(config.data_retention_days, 30);
        assert_eq!(report.applied, vec!["dataRetentionDays".to_string()]);
        assert_eq!(report.rejected.len(), 1);
        assert!(!report.restart_collection);
    }

    #[test]
    fn test_interval_change_requests_restart() {
        let mut config = AppConfig::default();
        let patch = ConfigPatch {
            collect_interval_minutes: Some(30),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert!(report.restart_collection);

        // Re-applying the same value is not a schedule change.
        let patch = ConfigPatch {
            collect_interval_minutes: Some(30),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert!(!report.restart_collection);
    }

    #[test]
    fn test_masked_token_rejected() {
        let mut config = AppConfig::default();
        config.access_token = "super-secret-token".to_string();
        let patch = ConfigPatch {
            access_token: Some(mask_secret("super-secret-token")),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert_eq!(config.access_token, "super-secret-token");
        assert!(report.applied.is_empty());
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn test_masked_endpoint_filtered_but_rest_applied() {
        let mut config = AppConfig::default();
        let patch = ConfigPatch {
            push: Some(PushPatch {
                endpoints: Some(vec![
                    "https://push.example.com/key1".to_string(),
                    "***abc123".to_string(),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert_eq!(
            config.push.endpoints,
            vec!["https://push.example.com/key1".to_string()]
        );
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn test_daily_report_time_validation() {
        let mut config = AppConfig::default();
        let patch = ConfigPatch {
            push: Some(PushPatch {
                daily_report: Some(DailyReportPatch {
                    enabled: Some(true),
                    time: Some("25:99".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert!(config.push.daily_report.enabled);
        assert_eq!(config.push.daily_report.time, "20:00");
        assert!(!report.restart_report);
        assert_eq!(report.rejected.len(), 1);

        let patch = ConfigPatch {
            push: Some(PushPatch {
                daily_report: Some(DailyReportPatch {
                    enabled: None,
                    time: Some("08:30".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = apply_patch(&mut config, patch);
        assert!(report.restart_report);
        assert_eq!(
            config.push.daily_report.time_of_day(),
            NaiveTime::from_hms_opt(8, 30, 0)
        );
    }

    #[test]
    fn test_mask_secret_shape() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("abcdefghij"), "***efghij");
        assert_eq!(mask_secret("abc"), "***abc");
    }
}
