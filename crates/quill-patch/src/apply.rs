//! Patch normalization, application, and inversion.
//!
//! The wire carries string-keyed RFC 6902 operations; normalization
//! turns them into the `json_patch` representation, application
//! evaluates them sequentially against a copy (the original content is
//! untouched on failure), and the inverse patch is the diff from the
//! new content back to the old.

use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;

/// A patch that failed to parse or apply.
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct PatchError(pub String);

/// Map the string-keyed wire representation into a [`Patch`].
pub fn normalize_patch(wire: &Value) -> Result<Patch, PatchError> {
    serde_json::from_value(wire.clone()).map_err(|error| PatchError(error.to_string()))
}

/// Apply a patch, returning the new content. The input is left
/// untouched when any operation fails.
pub fn apply_patch(content: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut next = content.clone();
    json_patch::patch(&mut next, patch).map_err(|error| PatchError(error.to_string()))?;
    Ok(next)
}

/// The patch that, applied to `new_content`, restores `old_content`.
pub fn inverse_patch(old_content: &Value, new_content: &Value) -> Patch {
    json_patch::diff(new_content, old_content)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_accepts_wire_operations() {
        let wire = json!([
            {"op": "replace", "path": "/title", "value": "T2"},
            {"op": "add", "path": "/items/0", "value": 1},
            {"op": "remove", "path": "/obsolete"}
        ]);
        let patch = normalize_patch(&wire).unwrap();
        assert_eq!(patch.0.len(), 3);
    }

    #[test]
    fn normalize_rejects_unknown_ops() {
        let wire = json!([{"op": "merge", "path": "/title", "value": "T2"}]);
        assert!(normalize_patch(&wire).is_err());
    }

    #[test]
    fn apply_replaces_values() {
        let content = json!({"title": "T"});
        let patch =
            normalize_patch(&json!([{"op": "replace", "path": "/title", "value": "T2"}])).unwrap();
        let next = apply_patch(&content, &patch).unwrap();
        assert_eq!(next, json!({"title": "T2"}));
        assert_eq!(content, json!({"title": "T"}));
    }

    #[test]
    fn failed_apply_leaves_the_original_untouched() {
        let content = json!({"title": "T"});
        let patch =
            normalize_patch(&json!([{"op": "replace", "path": "/missing", "value": 1}])).unwrap();
        assert!(apply_patch(&content, &patch).is_err());
        assert_eq!(content, json!({"title": "T"}));
    }

    #[test]
    fn inverse_restores_the_old_content() {
        let old_content = json!({"title": "T", "items": ["a", "b"]});
        let forward = normalize_patch(&json!([
            {"op": "replace", "path": "/title", "value": "T2"},
            {"op": "add", "path": "/items/1", "value": "x"}
        ]))
        .unwrap();

        let new_content = apply_patch(&old_content, &forward).unwrap();
        let reverse = inverse_patch(&old_content, &new_content);
        let restored = apply_patch(&new_content, &reverse).unwrap();
        assert_eq!(restored, old_content);
    }

    #[test]
    fn inverse_of_removal_reinstates_the_value() {
        let old_content = json!({"title": "T", "body": "keep me"});
        let forward = normalize_patch(&json!([{"op": "remove", "path": "/body"}])).unwrap();
        let new_content = apply_patch(&old_content, &forward).unwrap();

        let reverse = inverse_patch(&old_content, &new_content);
        assert_eq!(apply_patch(&new_content, &reverse).unwrap(), old_content);
    }
}
