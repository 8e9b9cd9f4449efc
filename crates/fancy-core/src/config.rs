// ── Runtime configuration for the synchronization layer ──
//
// Consumed by `FanStore::new()`. This is a runtime struct, NOT the on-disk
// file format; the CLI translates its TOML config into one of these.

use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::model::PollInterval;

/// Settings for one [`FanStore`](crate::FanStore).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Poll interval used until the backend reports its own.
    pub initial_poll_interval: PollInterval,
    /// Configs must score strictly above this to be suggested.
    pub match_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_poll_interval: PollInterval::Disabled,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}
