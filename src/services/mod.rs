pub mod aggregator;
pub mod alerts;
pub mod collector;
pub mod database;
pub mod market_api;
pub mod notifier;

pub use aggregator::Aggregator;
pub use alerts::{AlertEngine, NotifyOutcome};
pub use collector::{CollectOutcome, Collector, CycleStats};
pub use database::{DbStats, PriceStore};
pub use market_api::{MarketApiError, MarketClient};
pub use notifier::{Notifier, PushReport};
