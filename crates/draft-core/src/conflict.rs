//! Field-level conflict detection and resolution between a local draft and a
//! competing server copy.
//!
//! Detection walks both drafts' JSON representations and records every path
//! where they disagree, together with a merge hint. Resolution is a tagged
//! strategy ([`ResolutionStrategy`]) so new policies can be added without
//! touching the orchestrator:
//!
//! - `KeepLocal` / `AcceptServer` pick one side wholesale
//! - `AutoMerge` merges non-overlapping changes and tie-breaks contested
//!   fields local-wins (deterministic, see `auto_merge`)
//! - `Manual` applies caller-supplied per-path choices

use crate::document::{DraftDocument, Result};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// How a field differs between the local and server drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present on both sides with different values.
    Modified,
    /// Present only on the server.
    Added,
    /// Present only locally (absent on the server).
    Removed,
}

/// Suggested way to merge a single conflicted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeHint {
    PreferLocal,
    PreferServer,
    /// Concatenate (arrays end-to-end, strings space-joined).
    Concat,
    /// No safe automatic choice.
    Manual,
}

/// Broad categorization of what a conflict touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Content,
    Structure,
    Theme,
    Mixed,
}

/// A single disagreeing field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    /// Dotted path into the draft's JSON representation,
    /// e.g. `finalContent.content.hero.headline`.
    pub path: String,
    pub local: Option<Value>,
    pub server: Option<Value>,
    pub change: ChangeKind,
    pub auto_mergeable: bool,
    pub hint: MergeHint,
}

/// A detected conflict between the local draft and the server's copy.
///
/// Lives in the version store's active set until a strategy resolves it,
/// then is destroyed — its outcome is the accepted draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub conflict_id: String,
    /// Detection time in milliseconds since epoch.
    pub detected_at: u64,
    pub local: DraftDocument,
    pub server: DraftDocument,
    pub kind: ConflictKind,
    pub fields: Vec<FieldConflict>,
}

impl ConflictRecord {
    /// Diff `local` against `server` and build an unresolved record.
    pub fn detect(local: &DraftDocument, server: &DraftDocument, now_ms: u64) -> Result<Self> {
        let fields = diff_documents(local, server)?;
        Ok(Self {
            conflict_id: format!("conflict-{}", Uuid::new_v4()),
            detected_at: now_ms,
            local: local.clone(),
            server: server.clone(),
            kind: categorize(&fields),
            fields,
        })
    }
}

/// Reconciliation policy for a pending conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStrategy {
    /// Keep the local draft, discarding the server's changes.
    KeepLocal,
    /// Accept the server's copy, discarding local changes.
    AcceptServer,
    /// Merge non-overlapping changes; contested fields resolve local-wins.
    AutoMerge,
    /// Caller-supplied value per dotted path.
    Manual(HashMap<String, Value>),
}

impl ResolutionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionStrategy::KeepLocal => "local",
            ResolutionStrategy::AcceptServer => "server",
            ResolutionStrategy::AutoMerge => "merge",
            ResolutionStrategy::Manual(_) => "manual",
        }
    }

    /// Apply this strategy to a record, producing the accepted draft.
    pub fn apply(&self, record: &ConflictRecord) -> Result<DraftDocument> {
        match self {
            ResolutionStrategy::KeepLocal => Ok(record.local.clone()),
            ResolutionStrategy::AcceptServer => Ok(record.server.clone()),
            ResolutionStrategy::AutoMerge => auto_merge(record),
            ResolutionStrategy::Manual(resolutions) => manual_merge(record, resolutions),
        }
    }
}

/// Diff two drafts field-by-field.
///
/// The `lastUpdated` path is excluded: it is bookkeeping metadata, not
/// content, and would otherwise flag every detection.
pub fn diff_documents(local: &DraftDocument, server: &DraftDocument) -> Result<Vec<FieldConflict>> {
    let mut conflicts = Vec::new();
    diff_values(&local.to_value()?, &server.to_value()?, "", &mut conflicts);
    conflicts.retain(|c| c.path != "lastUpdated");
    Ok(conflicts)
}

fn diff_values(local: &Value, server: &Value, path: &str, out: &mut Vec<FieldConflict>) {
    if local == server {
        return;
    }

    match (local, server) {
        (Value::Object(local_map), Value::Object(server_map)) => {
            let mut keys: Vec<&String> = local_map.keys().chain(server_map.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                match (local_map.get(key), server_map.get(key)) {
                    (Some(l), Some(s)) => diff_values(l, s, &child_path, out),
                    (None, Some(s)) => out.push(FieldConflict {
                        path: child_path,
                        local: None,
                        server: Some(s.clone()),
                        change: ChangeKind::Added,
                        auto_mergeable: true,
                        hint: MergeHint::PreferServer,
                    }),
                    (Some(l), None) => out.push(FieldConflict {
                        path: child_path,
                        local: Some(l.clone()),
                        server: None,
                        change: ChangeKind::Removed,
                        auto_mergeable: false,
                        hint: MergeHint::Manual,
                    }),
                    (None, None) => unreachable!("key came from one of the maps"),
                }
            }
        }
        _ => {
            let (auto_mergeable, hint) = classify_leaf(local, server);
            out.push(FieldConflict {
                path: path.to_string(),
                local: Some(local.clone()),
                server: Some(server.clone()),
                change: ChangeKind::Modified,
                auto_mergeable,
                hint,
            });
        }
    }
}

/// Merge eligibility and hint for a leaf disagreement.
fn classify_leaf(local: &Value, server: &Value) -> (bool, MergeHint) {
    match (local, server) {
        (Value::String(l), Value::String(s)) => {
            if l.trim().is_empty() {
                (true, MergeHint::PreferServer)
            } else if s.trim().is_empty() {
                (true, MergeHint::PreferLocal)
            } else if l.contains(s.as_str()) {
                (true, MergeHint::PreferLocal)
            } else if s.contains(l.as_str()) {
                (true, MergeHint::PreferServer)
            } else {
                (false, MergeHint::Manual)
            }
        }
        (Value::Array(_), Value::Array(_)) => (true, MergeHint::Concat),
        (Value::Number(l), Value::Number(s)) => {
            // Near-equal numbers (drift from rounding) are not worth a
            // manual decision; the local value stands.
            let close = match (l.as_f64(), s.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() < 0.1,
                _ => false,
            };
            if close {
                (true, MergeHint::PreferLocal)
            } else {
                (false, MergeHint::Manual)
            }
        }
        _ => (false, MergeHint::Manual),
    }
}

/// Categorize a conflict from the paths it touches.
fn categorize(fields: &[FieldConflict]) -> ConflictKind {
    let has_content = fields.iter().any(|f| f.path.contains("content"));
    let has_theme = fields.iter().any(|f| f.path.contains("theme"));
    let has_structure = fields
        .iter()
        .any(|f| f.path.contains("layout") || f.path.contains("sections"));

    if has_content && has_theme && has_structure {
        ConflictKind::Mixed
    } else if has_theme {
        ConflictKind::Theme
    } else if has_structure {
        ConflictKind::Structure
    } else {
        ConflictKind::Content
    }
}

/// Merge auto-mergeable fields per their hints; every other field keeps the
/// local value. The local-wins tie-break makes auto-merge total: the result
/// is always a fully accepted draft.
fn auto_merge(record: &ConflictRecord) -> Result<DraftDocument> {
    let mut merged = record.local.to_value()?;

    for field in &record.fields {
        if !field.auto_mergeable {
            continue; // local wins
        }
        match field.hint {
            MergeHint::PreferLocal => {}
            MergeHint::PreferServer => {
                if let Some(server) = &field.server {
                    set_path(&mut merged, &field.path, server.clone());
                }
            }
            MergeHint::Concat => {
                let combined = concat_values(field.local.as_ref(), field.server.as_ref());
                set_path(&mut merged, &field.path, combined);
            }
            MergeHint::Manual => {}
        }
    }

    DraftDocument::from_value(merged)
}

/// Apply caller-supplied choices over the local draft.
fn manual_merge(
    record: &ConflictRecord,
    resolutions: &HashMap<String, Value>,
) -> Result<DraftDocument> {
    let mut merged = record.local.to_value()?;
    for (path, value) in resolutions {
        set_path(&mut merged, path, value.clone());
    }
    DraftDocument::from_value(merged)
}

fn concat_values(local: Option<&Value>, server: Option<&Value>) -> Value {
    match (local, server) {
        (Some(Value::Array(l)), Some(Value::Array(s))) => {
            Value::Array(l.iter().chain(s.iter()).cloned().collect())
        }
        (Some(Value::String(l)), Some(Value::String(s))) => {
            Value::String(format!("{l} {s}").trim().to_string())
        }
        (Some(l), _) => l.clone(),
        (None, Some(s)) => s.clone(),
        (None, None) => Value::Null,
    }
}

/// Set a dotted path inside a JSON value, creating intermediate objects.
fn set_path(root: &mut Value, path: &str, new_value: Value) {
    let mut current = root;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        if parts.peek().is_none() {
            current
                .as_object_mut()
                .expect("just ensured object")
                .insert(part.to_string(), new_value);
            return;
        }
        current = current
            .as_object_mut()
            .expect("just ensured object")
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}
