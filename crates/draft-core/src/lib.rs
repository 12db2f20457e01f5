//! draft-core: data model and history logic for the draft persistence engine.
//!
//! This crate provides the clock-free core:
//! - The draft document model and its wire shape
//! - Structural validation at the save/load boundary
//! - Field-level conflict detection and resolution strategies
//! - The bounded version store with linear undo/redo
//!
//! Async orchestration (debouncing, retries, queues, the remote store) lives
//! in the `draft-engine` crate.

pub mod conflict;
pub mod document;
pub mod validate;
pub mod version;

pub use conflict::{
    ChangeKind, ConflictKind, ConflictRecord, FieldConflict, MergeHint, ResolutionStrategy,
};
pub use document::{DraftDocument, FinalContent, OnboardingFields};
pub use validate::{DraftValidator, StructuralValidator, Validation};
pub use version::{
    HistorySummary, SnapshotOrigin, VersionConfig, VersionSnapshot, VersionStore,
};
