//! Version store: bounded snapshot history with linear undo/redo, plus the
//! registry of unresolved conflicts against server copies.
//!
//! Snapshots are immutable, named, timestamped copies of the draft. The
//! history is linear: taking a snapshot after an undo discards the abandoned
//! redo branch. Undo/redo move a cursor over the history and never mutate
//! snapshot contents.
//!
//! Every time-sensitive operation takes `now_ms` so the store is testable
//! without a clock.

use crate::conflict::{ConflictRecord, ResolutionStrategy};
use crate::document::{DocumentError, DraftDocument};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("unknown conflict: {0}")]
    UnknownConflict(String),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Explicit user action (manual save, force save, named checkpoint).
    User,
    /// Automatic cadence snapshot taken every Nth successful save.
    AutoSave,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOrigin::User => "user",
            SnapshotOrigin::AutoSave => "auto-save",
        }
    }
}

/// An immutable point-in-time copy of the draft.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSnapshot {
    pub id: String,
    /// Creation time in milliseconds since epoch.
    pub timestamp: u64,
    /// Monotonic sequence number, unique for the life of the store.
    pub sequence: u64,
    pub description: String,
    pub origin: SnapshotOrigin,
    pub data: DraftDocument,
    /// Serialized size of `data` in bytes.
    pub size_bytes: usize,
}

/// Version store tunables.
#[derive(Debug, Clone)]
pub struct VersionConfig {
    /// Maximum retained snapshots; the oldest is evicted beyond this.
    pub max_snapshots: usize,
    /// Auto-snapshot every Nth successful save.
    pub auto_snapshot_interval: u64,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 25,
            auto_snapshot_interval: 5,
        }
    }
}

/// Aggregate view of the history, for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub total_snapshots: usize,
    /// Sequence number of the snapshot under the cursor.
    pub current_sequence: Option<u64>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub total_bytes: usize,
    pub oldest_timestamp: Option<u64>,
    pub newest_timestamp: Option<u64>,
}

/// Bounded, ordered snapshot history plus active conflicts.
pub struct VersionStore {
    config: VersionConfig,
    snapshots: Vec<VersionSnapshot>,
    /// Index of the current snapshot; `None` until the first snapshot.
    cursor: Option<usize>,
    next_sequence: u64,
    active_conflicts: HashMap<String, ConflictRecord>,
}

impl VersionStore {
    pub fn new(config: VersionConfig) -> Self {
        Self {
            config,
            snapshots: Vec::new(),
            cursor: None,
            next_sequence: 1,
            active_conflicts: HashMap::new(),
        }
    }

    // ==================== snapshots ====================

    /// Take a snapshot, truncating any redo branch and evicting the oldest
    /// snapshot beyond `max_snapshots`. Returns the snapshot id.
    pub fn create_snapshot(
        &mut self,
        data: &DraftDocument,
        description: impl Into<String>,
        origin: SnapshotOrigin,
        now_ms: u64,
    ) -> String {
        // A snapshot taken after an undo abandons everything ahead of the
        // cursor, matching linear undo/redo semantics.
        if let Some(cursor) = self.cursor {
            if cursor + 1 < self.snapshots.len() {
                self.snapshots.truncate(cursor + 1);
            }
        }

        let snapshot = VersionSnapshot {
            id: format!("version-{}", Uuid::new_v4()),
            timestamp: now_ms,
            sequence: self.next_sequence,
            description: description.into(),
            origin,
            data: data.clone(),
            size_bytes: data.size_bytes(),
        };
        self.next_sequence += 1;

        debug!(
            id = %snapshot.id,
            sequence = snapshot.sequence,
            origin = origin.as_str(),
            size_bytes = snapshot.size_bytes,
            "version snapshot created"
        );

        let id = snapshot.id.clone();
        self.snapshots.push(snapshot);
        self.cursor = Some(self.snapshots.len() - 1);

        if self.snapshots.len() > self.config.max_snapshots {
            let removed = self.snapshots.remove(0);
            self.cursor = Some(self.snapshots.len() - 1);
            debug!(id = %removed.id, "evicted oldest snapshot");
        }

        id
    }

    /// True every Nth successful save.
    pub fn should_create_auto_snapshot(&self, success_count: u64) -> bool {
        success_count > 0 && success_count % self.config.auto_snapshot_interval == 0
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor + 1 < self.snapshots.len())
    }

    /// Step back one snapshot. Past the oldest snapshot this is a no-op
    /// returning `None`, not an error.
    pub fn undo(&mut self) -> Option<VersionSnapshot> {
        if !self.can_undo() {
            return None;
        }
        let cursor = self.cursor.unwrap() - 1;
        self.cursor = Some(cursor);
        let snapshot = &self.snapshots[cursor];
        debug!(sequence = snapshot.sequence, "undo");
        Some(snapshot.clone())
    }

    /// Step forward one snapshot. Past the newest this is a no-op.
    pub fn redo(&mut self) -> Option<VersionSnapshot> {
        if !self.can_redo() {
            return None;
        }
        let cursor = self.cursor.unwrap() + 1;
        self.cursor = Some(cursor);
        let snapshot = &self.snapshots[cursor];
        debug!(sequence = snapshot.sequence, "redo");
        Some(snapshot.clone())
    }

    /// The snapshot under the cursor.
    pub fn current(&self) -> Option<&VersionSnapshot> {
        self.cursor.map(|cursor| &self.snapshots[cursor])
    }

    pub fn get(&self, id: &str) -> Option<&VersionSnapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            total_snapshots: self.snapshots.len(),
            current_sequence: self.current().map(|s| s.sequence),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            total_bytes: self.snapshots.iter().map(|s| s.size_bytes).sum(),
            oldest_timestamp: self.snapshots.first().map(|s| s.timestamp),
            newest_timestamp: self.snapshots.last().map(|s| s.timestamp),
        }
    }

    /// Drop all snapshots and active conflicts.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
        self.active_conflicts.clear();
    }

    // ==================== conflicts ====================

    /// Diff the local draft against the server's copy and register the
    /// result as an active conflict.
    pub fn detect_conflicts_with_server(
        &mut self,
        local: &DraftDocument,
        server: &DraftDocument,
        now_ms: u64,
    ) -> Result<ConflictRecord> {
        let record = ConflictRecord::detect(local, server, now_ms)?;
        debug!(
            conflict_id = %record.conflict_id,
            kind = ?record.kind,
            fields = record.fields.len(),
            auto_mergeable = record.fields.iter().filter(|f| f.auto_mergeable).count(),
            "conflict detected"
        );
        self.active_conflicts
            .insert(record.conflict_id.clone(), record.clone());
        Ok(record)
    }

    pub fn active_conflicts(&self) -> Vec<ConflictRecord> {
        self.active_conflicts.values().cloned().collect()
    }

    pub fn conflict(&self, conflict_id: &str) -> Option<&ConflictRecord> {
        self.active_conflicts.get(conflict_id)
    }

    /// Resolve a pending conflict with the given strategy. The record is
    /// removed from the active set and the accepted draft returned.
    pub fn resolve(
        &mut self,
        conflict_id: &str,
        strategy: &ResolutionStrategy,
    ) -> Result<DraftDocument> {
        let Some(record) = self.active_conflicts.get(conflict_id) else {
            warn!(conflict_id, "resolve called for unknown conflict");
            return Err(VersionError::UnknownConflict(conflict_id.to_string()));
        };

        let merged = strategy.apply(record)?;
        self.active_conflicts.remove(conflict_id);
        debug!(conflict_id, strategy = strategy.name(), "conflict resolved");

        Ok(merged)
    }

    /// Merge non-overlapping changes automatically; contested fields resolve
    /// local-wins (see [`crate::conflict`]).
    pub fn auto_resolve(&mut self, conflict_id: &str) -> Result<DraftDocument> {
        self.resolve(conflict_id, &ResolutionStrategy::AutoMerge)
    }

    /// Apply caller-supplied field-by-field choices.
    pub fn manual_resolve(
        &mut self,
        conflict_id: &str,
        resolutions: HashMap<String, Value>,
    ) -> Result<DraftDocument> {
        self.resolve(conflict_id, &ResolutionStrategy::Manual(resolutions))
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new(VersionConfig::default())
    }
}
