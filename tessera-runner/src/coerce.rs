//! Field-kind value coercion.
//!
//! Shared by the input formatter and the filter translator so an update value
//! and a filter value for the same field land in storage with the same type.
//! Coercion never fails: a value that cannot be converted is returned as
//! given and the store decides whether to accept it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value as JsonValue};
use tessera_core::FieldKind;

/// Coerce a caller value to the storage form of a scalar kind.
pub fn coerce_value(kind: &FieldKind, value: &JsonValue) -> JsonValue {
    if value.is_null() {
        return JsonValue::Null;
    }
    match kind {
        FieldKind::Number => coerce_number(value),
        FieldKind::Boolean => coerce_boolean(value),
        FieldKind::DateTime => coerce_date_time(value),
        FieldKind::Uuid | FieldKind::Relation(_) => match value {
            JsonValue::String(s) => JsonValue::String(s.trim().to_ascii_lowercase()),
            other => other.clone(),
        },
        FieldKind::Select { options } => coerce_option(options, value),
        FieldKind::MultiSelect { options } => match value {
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| coerce_option(options, v)).collect())
            }
            single => JsonValue::Array(vec![coerce_option(options, single)]),
        },
        FieldKind::Text
        | FieldKind::RawJson
        | FieldKind::Currency
        | FieldKind::FullName
        | FieldKind::Links => value.clone(),
    }
}

fn coerce_number(value: &JsonValue) -> JsonValue {
    let JsonValue::String(s) = value else {
        return value.clone();
    };
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or_else(|| value.clone())
}

fn coerce_boolean(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Normalize to RFC 3339 UTC with millisecond precision.
fn coerce_date_time(value: &JsonValue) -> JsonValue {
    let JsonValue::String(s) = value else {
        return value.clone();
    };
    parse_date_time(s.trim())
        .map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or_else(|| value.clone())
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Map a select value onto its declared option, ignoring case.
fn coerce_option(options: &[String], value: &JsonValue) -> JsonValue {
    let JsonValue::String(s) = value else {
        return value.clone();
    };
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(s.trim()))
        .map(|option| JsonValue::String(option.clone()))
        .unwrap_or_else(|| value.clone())
}
