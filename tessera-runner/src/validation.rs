//! Pre-flight checks for a batch update.
//!
//! Everything here runs before the store is touched and has no side effects.
//! Checks run in a fixed order so a request with several problems always
//! reports the same one: mutability, filter presence, filter shape,
//! identifiers, then payload.

use crate::error::RunnerResult;
use serde_json::{Map, Value as JsonValue};
use tessera_core::{
    is_valid_record_id, FilterError, FilterExpr, ObjectTypeDescriptor, ValidationError,
    PRIMARY_KEY_FIELD,
};

/// Check a request and return its parsed filter.
pub fn validate_update_many(
    descriptor: &ObjectTypeDescriptor,
    filter: Option<&JsonValue>,
    data: &Map<String, JsonValue>,
    max_filter_depth: usize,
) -> RunnerResult<FilterExpr> {
    if !descriptor.is_writable() {
        return Err(ValidationError::MutationNotAllowed {
            object_type: descriptor.name_singular.clone(),
        }
        .into());
    }

    let filter = validate_filter(filter, max_filter_depth)?;
    validate_identifiers(&filter)?;
    validate_payload(data)?;
    Ok(filter)
}

/// Parse the caller's filter, rejecting absent, empty and over-deep trees.
pub fn validate_filter(filter: Option<&JsonValue>, max_depth: usize) -> RunnerResult<FilterExpr> {
    let raw = match filter {
        None | Some(JsonValue::Null) => return Err(ValidationError::MissingFilter.into()),
        Some(raw) => raw,
    };

    // Checked on the raw JSON so a hostile nesting level is rejected before
    // the recursive parser walks it.
    if json_depth(raw) > max_depth * 2 + 8 {
        return Err(ValidationError::InvalidFilter {
            reason: format!("nesting exceeds maximum depth of {}", max_depth),
        }
        .into());
    }

    let parsed = FilterExpr::from_json(raw)?;
    if parsed.is_empty() {
        return Err(ValidationError::MissingFilter.into());
    }
    let depth = parsed.depth();
    if depth > max_depth {
        return Err(FilterError::TooDeep {
            depth,
            max: max_depth,
        }
        .into());
    }
    Ok(parsed)
}

/// Every `id eq` / `id in` value must be a canonical UUID.
pub fn validate_identifiers(filter: &FilterExpr) -> RunnerResult<()> {
    match filter
        .identifier_values()
        .into_iter()
        .find(|value| !is_valid_record_id(value))
    {
        Some(value) => Err(ValidationError::InvalidIdentifier { value }.into()),
        None => Ok(()),
    }
}

pub fn validate_payload(data: &Map<String, JsonValue>) -> RunnerResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidValue {
        field: "data".to_string(),
        reason: reason.to_string(),
    };
    if data.is_empty() {
        return Err(invalid("update payload is empty").into());
    }
    if data.contains_key(PRIMARY_KEY_FIELD) {
        return Err(invalid("the primary key cannot be updated").into());
    }
    Ok(())
}

/// Nesting depth of a JSON value, iteratively.
fn json_depth(value: &JsonValue) -> usize {
    let mut max = 0;
    let mut stack = vec![(value, 1usize)];
    while let Some((node, depth)) = stack.pop() {
        max = max.max(depth);
        match node {
            JsonValue::Object(map) => stack.extend(map.values().map(|v| (v, depth + 1))),
            JsonValue::Array(items) => stack.extend(items.iter().map(|v| (v, depth + 1))),
            _ => {}
        }
    }
    max
}
