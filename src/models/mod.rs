mod game;
mod period;
mod snapshot;

pub use game::TrackedGame;
pub use period::Period;
pub use snapshot::{PriceSnapshot, SnapshotSummary};
