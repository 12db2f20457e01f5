//! TTL cache for loaded drafts.
//!
//! A freshness cache, not an LRU: entries expire after their ttl and are
//! lazily evicted on lookup (plus a sweep on every insert). Its only job is
//! avoiding redundant network loads of the same draft within a short window.
//!
//! All operations take `now_ms` so expiry is testable without waiting.

use draft_core::document::DraftDocument;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: DraftDocument,
    /// Insertion time in milliseconds since epoch.
    timestamp: u64,
    ttl_ms: u64,
}

impl CacheEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.ttl_ms
    }
}

/// TTL-based store of the last successfully loaded draft per id.
#[derive(Debug, Default)]
pub struct LoadCache {
    entries: HashMap<String, CacheEntry>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `key`, or `None`. Expired entries are evicted here.
    /// Returns the draft together with its insertion timestamp.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<(&DraftDocument, u64)> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now_ms)) {
            debug!(key, "evicting expired cache entry");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| (&e.data, e.timestamp))
    }

    pub fn insert(&mut self, key: impl Into<String>, data: DraftDocument, ttl_ms: u64, now_ms: u64) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                data,
                timestamp: now_ms,
                ttl_ms,
            },
        );
        self.sweep(now_ms);
    }

    /// Evict every expired entry.
    pub fn sweep(&mut self, now_ms: u64) {
        self.entries.retain(|_, e| !e.is_expired(now_ms));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
