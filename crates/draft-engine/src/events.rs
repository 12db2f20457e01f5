//! Persistence lifecycle events for monitoring and diagnostics.
//!
//! This is the engine's inspection surface: instead of a mutable debug
//! global, interested layers subscribe to `PersistenceEvent`s (and read
//! `state()` / `metrics()`). Subscriptions follow the disposer pattern and
//! unsubscribe when dropped.

use crate::queue::SaveTrigger;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Events emitted at persistence state transitions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PersistenceEvent {
    /// A save attempt started.
    SaveStarted {
        trigger: &'static str,
        /// Milliseconds since Unix epoch.
        timestamp: u64,
    },
    /// A save was accepted by the remote store.
    SaveCompleted {
        trigger: &'static str,
        /// Document version after the save.
        version: u64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        compressed: bool,
        timestamp: u64,
    },
    /// A save attempt failed.
    SaveFailed {
        trigger: &'static str,
        error: String,
        /// Failures of the current logical save so far.
        attempt: u32,
        #[serde(rename = "willRetry")]
        will_retry: bool,
        timestamp: u64,
    },
    /// The server's copy diverged from the local baseline.
    ConflictDetected {
        #[serde(rename = "conflictId")]
        conflict_id: String,
        /// Number of disagreeing fields.
        fields: usize,
        timestamp: u64,
    },
    /// A pending conflict was folded back into an accepted draft.
    ConflictResolved {
        #[serde(rename = "conflictId")]
        conflict_id: String,
        strategy: &'static str,
        timestamp: u64,
    },
    /// A load finished, from cache or from the remote store.
    LoadCompleted {
        #[serde(rename = "tokenId")]
        token_id: String,
        #[serde(rename = "fromCache")]
        from_cache: bool,
        timestamp: u64,
    },
    /// A version snapshot was taken.
    SnapshotCreated {
        #[serde(rename = "snapshotId")]
        snapshot_id: String,
        origin: &'static str,
        timestamp: u64,
    },
}

impl PersistenceEvent {
    pub(crate) fn save_started(trigger: SaveTrigger, timestamp: u64) -> Self {
        Self::SaveStarted {
            trigger: trigger.as_str(),
            timestamp,
        }
    }
}

/// Subscription handle; dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Publishes persistence events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions; safe to emit from any task.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(PersistenceEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns a [`Subscription`] that unsubscribes on
    /// drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(PersistenceEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while a read lock is held.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: PersistenceEvent) {
        // Clone the list so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
