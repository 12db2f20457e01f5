//! Structural validation of drafts before persistence.
//!
//! Validation is an external collaborator at the save/load boundary: it gates
//! `perform_save` and annotates loads, and never mutates a draft. The default
//! [`StructuralValidator`] checks shape only; business rules for individual
//! fields live outside this crate.

use crate::document::DraftDocument;
use serde_json::Value;

/// Outcome of a validation pass.
///
/// `errors` are fatal for saves; `warnings` are informational (loads surface
/// shape problems as warnings and never fail on them).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// All findings, errors first. Used where a caller treats everything as
    /// advisory (load validation).
    pub fn findings(&self) -> Vec<String> {
        let mut all = self.errors.clone();
        all.extend(self.warnings.iter().cloned());
        all
    }
}

/// Validation collaborator interface.
pub trait DraftValidator: Send + Sync {
    /// Gate a draft before it is written to the remote store.
    fn validate_save(&self, draft: &DraftDocument) -> Validation;

    /// Check the shape of a draft returned by the remote store.
    fn validate_load(&self, draft: &DraftDocument) -> Validation;
}

/// Default validator: structural checks only.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl DraftValidator for StructuralValidator {
    fn validate_save(&self, draft: &DraftDocument) -> Validation {
        let mut errors = Vec::new();

        if draft.token_id.trim().is_empty() {
            errors.push("token id is required".to_string());
        }

        if let Some(onboarding) = &draft.onboarding {
            for (name, value) in [
                ("validatedFields", &onboarding.validated_fields),
                ("hiddenInferredFields", &onboarding.hidden_inferred_fields),
                ("confirmedFields", &onboarding.confirmed_fields),
            ] {
                for (key, field) in value.iter() {
                    if !is_scalar_or_structured(field) {
                        errors.push(format!("{name}.{key} has an unsupported value"));
                    }
                }
            }

            for (index, feature) in onboarding.features.iter().enumerate() {
                if !is_feature_item(feature) {
                    errors.push(format!("features[{index}] is not a valid feature item"));
                }
            }
        }

        Validation::from_parts(errors, Vec::new())
    }

    fn validate_load(&self, draft: &DraftDocument) -> Validation {
        let mut warnings = Vec::new();

        if draft.token_id.trim().is_empty() {
            warnings.push("loaded draft missing token id".to_string());
        }

        if let Some(final_content) = &draft.final_content {
            if final_content.layout.is_none() {
                warnings.push("final content missing layout data".to_string());
            }
            if final_content.content.is_none() {
                warnings.push("final content missing content data".to_string());
            }
        }

        Validation::from_parts(Vec::new(), warnings)
    }
}

/// A feature item is an object whose `feature` property is a non-empty string.
fn is_feature_item(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("feature"))
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty())
}

fn is_scalar_or_structured(value: &Value) -> bool {
    // Everything serde_json can represent is persistable; reject only
    // floating NaN/Infinity, which the wire format cannot carry.
    match value {
        Value::Number(n) => n.as_f64().is_none_or(f64::is_finite),
        _ => true,
    }
}
