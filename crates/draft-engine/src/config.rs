//! Persistence engine tunables.

use draft_core::version::VersionConfig;
use std::time::Duration;

/// Configuration for the persistence manager.
///
/// Defaults match the production tuning of the editor this engine serves:
/// background sweeps every 30 s, user bursts debounced at 500 ms, three
/// retries with linear 1 s backoff, payloads over 100 KiB marked for
/// compression, loaded drafts cached for five minutes.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Period of the background save timer.
    pub background_interval: Duration,
    /// Quiet period before a debounced auto-save fires.
    pub debounce_delay: Duration,
    /// Additional attempts after a failed remote save.
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
    /// Whether to keep version snapshots.
    pub enable_version_control: bool,
    /// Whether to check the server for divergence before each save.
    pub enable_conflict_detection: bool,
    /// Payloads serialized beyond this size are marked compressed.
    pub compression_threshold: usize,
    /// Time-to-live for cached loads.
    pub cache_ttl: Duration,
    /// Snapshot history tunables.
    pub version: VersionConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            background_interval: Duration::from_secs(30),
            debounce_delay: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            enable_version_control: true,
            enable_conflict_detection: true,
            compression_threshold: 100 * 1024,
            cache_ttl: Duration::from_secs(300),
            version: VersionConfig::default(),
        }
    }
}
