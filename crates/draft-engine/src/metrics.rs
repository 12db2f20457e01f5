//! Persistence counters.
//!
//! Append-only for the life of a manager; reset only by constructing a new
//! one. Exposed read-only through `PersistenceManager::metrics()`.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceMetrics {
    /// Save attempts, including retries.
    pub total_saves: u64,
    pub successful_saves: u64,
    pub failed_saves: u64,
    /// Running average duration of successful saves, in milliseconds.
    pub average_save_ms: f64,
    /// Duration of the most recent successful save.
    pub last_save_ms: u64,
    pub total_loads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

impl PersistenceMetrics {
    /// Record a successful save and fold its duration into the average.
    pub(crate) fn record_success(&mut self, duration_ms: u64) {
        self.successful_saves += 1;
        self.last_save_ms = duration_ms;
        let count = self.successful_saves as f64;
        self.average_save_ms =
            (self.average_save_ms * (count - 1.0) + duration_ms as f64) / count;
    }
}
