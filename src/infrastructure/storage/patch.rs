//! JSON merge patch (RFC 7396) applied to typed resources

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{DomainError, DomainResult};

/// Field every patch must carry
pub const LAST_UPDATED: &str = "last_updated";

/// Overlay `patch` onto `target` in place
///
/// Objects merge recursively, `null` deletes a member and every other value
/// (arrays included) replaces the target member wholesale.
pub fn merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_members) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target_members) = target {
                for (key, value) in patch_members {
                    if value.is_null() {
                        target_members.remove(key);
                    } else {
                        merge(
                            target_members.entry(key.clone()).or_insert(Value::Null),
                            value,
                        );
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Reject anything that is not a non-empty object carrying `last_updated`
pub fn validate(patch: &Value) -> DomainResult<&Map<String, Value>> {
    let members = patch
        .as_object()
        .ok_or_else(|| DomainError::InvalidPatch("patch must be a JSON object".into()))?;
    if members.is_empty() {
        return Err(DomainError::InvalidPatch("patch is empty".into()));
    }
    match members.get(LAST_UPDATED) {
        Some(value) if !value.is_null() => Ok(members),
        _ => Err(DomainError::InvalidPatch(format!(
            "patch must set {LAST_UPDATED}"
        ))),
    }
}

/// True when the patch only moves `status` (and the timestamp)
pub fn is_status_only(patch: &Value) -> bool {
    patch.as_object().is_some_and(|members| {
        members.contains_key("status")
            && members
                .keys()
                .all(|key| key == "status" || key == LAST_UPDATED)
    })
}

/// Apply `patch` to a copy of `existing` and parse the result back
///
/// Identity checks are left to the caller, which knows the key fields.
pub fn apply<T>(existing: &T, patch: &Value) -> DomainResult<T>
where
    T: Serialize + DeserializeOwned,
{
    validate(patch)?;
    let mut document = serde_json::to_value(existing)
        .map_err(|e| DomainError::InvalidPatch(format!("cannot serialize resource: {e}")))?;
    merge(&mut document, patch);
    serde_json::from_value(document)
        .map_err(|e| DomainError::InvalidPatch(format!("patched resource is invalid: {e}")))
}
