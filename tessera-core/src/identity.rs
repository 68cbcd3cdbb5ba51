//! Identity types for Tessera records

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Record identifier. Every object type uses a UUID primary key stored in `id`.
pub type RecordId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Name of the primary key field shared by every object type.
pub const PRIMARY_KEY_FIELD: &str = "id";

/// Canonical hyphenated UUID, any version, either case.
static CANONICAL_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("Invalid UUID regex")
});

/// Generate a new UUIDv7 RecordId (timestamp-sortable).
pub fn new_record_id() -> RecordId {
    Uuid::now_v7()
}

/// Check whether a string is a syntactically valid record identifier.
///
/// Only the canonical `8-4-4-4-12` form is accepted. `Uuid::parse_str` alone
/// would also take braced, URN and simple forms, which the store never emits.
pub fn is_valid_record_id(value: &str) -> bool {
    CANONICAL_UUID.is_match(value)
}

/// Parse a record identifier, rejecting non-canonical spellings.
pub fn parse_record_id(value: &str) -> Option<RecordId> {
    if !is_valid_record_id(value) {
        return None;
    }
    Uuid::parse_str(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_uuid_is_valid() {
        let id = new_record_id();
        assert!(is_valid_record_id(&id.to_string()));
        assert_eq!(parse_record_id(&id.to_string()), Some(id));
    }

    #[test]
    fn test_uppercase_uuid_is_valid() {
        assert!(is_valid_record_id("20202020-ABCD-4E5F-8A9B-0123456789AB"));
    }

    #[test]
    fn test_non_canonical_forms_rejected() {
        assert!(!is_valid_record_id("not-a-uuid"));
        assert!(!is_valid_record_id(""));
        assert!(!is_valid_record_id("20202020abcd4e5f8a9b0123456789ab"));
        assert!(!is_valid_record_id("{20202020-abcd-4e5f-8a9b-0123456789ab}"));
        assert!(!is_valid_record_id(" 20202020-abcd-4e5f-8a9b-0123456789ab"));
        assert_eq!(parse_record_id("not-a-uuid"), None);
    }
}
