//! Typed outcomes of the public save/load operations.
//!
//! All failures cross the API boundary as values: callers branch on the
//! error variant, nothing is thrown past the manager. Collaborator errors
//! (validation, conflict detection, remote I/O) are converted into these
//! types at the `perform_save` / `load_from_server` boundary.

use crate::queue::SaveTrigger;
use draft_core::document::DraftDocument;
use thiserror::Error;

/// A successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    /// Completion time in milliseconds since epoch.
    pub timestamp: u64,
    /// The document version after this save.
    pub version: u64,
    /// Wall-clock duration of the accepted attempt.
    pub duration_ms: u64,
    /// Whether the payload was marked for compression.
    pub compressed: bool,
    pub trigger: SaveTrigger,
}

#[derive(Debug, Error)]
pub enum SaveError {
    /// The payload failed structural checks before any network call.
    /// Never retried.
    #[error("save validation failed: {}", errors.join(", "))]
    Validation { errors: Vec<String> },

    /// The server's copy is newer than the client's last save. The write was
    /// never issued; resolve the conflict before retrying.
    #[error("conflict detected: server draft is newer than last local save")]
    Conflict {
        conflict_id: String,
        /// The server's competing draft.
        server: Box<DraftDocument>,
    },

    /// Transient remote failure. `will_retry` is set while attempts remain;
    /// once exhausted the error is terminal.
    #[error("remote save failed (attempt {attempts}): {message}")]
    Remote {
        message: String,
        attempts: u32,
        will_retry: bool,
    },

    /// The save was parked on the queue and the queue was cleared (by a
    /// forced save or teardown) before it ran.
    #[error("queued save was cancelled before it ran")]
    Cancelled,

    /// The manager was destroyed while this save was pending.
    #[error("persistence manager is shutting down")]
    ShuttingDown,
}

pub type SaveResult = std::result::Result<SaveReceipt, SaveError>;

/// A successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub document: DraftDocument,
    pub from_cache: bool,
    /// Cache-entry timestamp for cache hits, completion time otherwise.
    pub timestamp: u64,
    /// Non-fatal shape findings from load validation.
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("remote load failed: {0}")]
    Remote(String),

    #[error("persistence manager is shutting down")]
    ShuttingDown,
}

pub type LoadResult = std::result::Result<LoadOutcome, LoadError>;
