//! Process-wide constants shared by the collector, scheduler and API layer.

use chrono_tz::Tz;

/// Upstream listing page size per collection attempt.
pub const LISTING_PAGE_SIZE: u32 = 100;

/// Total wall-time bound for one catalog fetch.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Per-endpoint timeout for notification dispatch.
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Delay before the one-off collection fired right after startup.
pub const STARTUP_COLLECT_DELAY_SECS: u64 = 2;

/// Fixed time zone for time-of-day schedules (retention purge, daily report).
pub const SCHEDULE_TZ: Tz = chrono_tz::Asia::Shanghai;

/// SQLite database file name inside the data directory.
pub const DB_FILE: &str = "prices.db";

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Number of trailing characters left visible when a secret is masked.
pub const MASK_VISIBLE_SUFFIX: usize = 6;

/// Marker prefixing masked secrets echoed back by the config API.
pub const MASK_MARKER: &str = "***";
