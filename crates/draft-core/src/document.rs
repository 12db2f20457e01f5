//! DraftDocument: the editable unit being persisted.
//!
//! A draft is the in-memory state of a landing-page project: an identifier,
//! a title, the user's one-liner, an optional onboarding block of business
//! fields, and an optional finalized content block. Business fields are
//! modeled as raw JSON values; their semantics belong to external
//! collaborators, this crate only persists and diffs them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// Fallback title used when a draft has none.
pub const UNTITLED: &str = "Untitled Project";

/// Onboarding business fields carried by a draft.
///
/// The individual fields are opaque JSON at this layer; structural checks
/// live in [`crate::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingFields {
    /// Confirmed input variables keyed by canonical field name.
    pub validated_fields: Map<String, Value>,
    /// Fields inferred by analysis rather than entered by the user.
    pub hidden_inferred_fields: Map<String, Value>,
    /// Feature items suggested for the page.
    pub features: Vec<Value>,
    /// Fields the user explicitly confirmed.
    pub confirmed_fields: Map<String, Value>,
}

/// Finalized page content: layout plus rendered content substructures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// A landing-page draft as loaded from or persisted to the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftDocument {
    /// Document identifier. Required for every save.
    pub token_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The user's one-liner describing the project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<OnboardingFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_content: Option<FinalContent>,
    /// Server-side last-modified time in milliseconds since epoch.
    /// Present on loaded drafts; used as the conflict-comparison timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<u64>,
}

impl DraftDocument {
    /// Create an empty draft for an identifier.
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            ..Self::default()
        }
    }

    /// Title, falling back to [`UNTITLED`].
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }

    /// JSON representation used for field-level diffing and size accounting.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Rebuild a draft from its JSON representation.
    ///
    /// Unknown fields are dropped; missing fields take their defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Serialized size in bytes.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}
