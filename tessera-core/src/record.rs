//! Canonical record shapes
//!
//! A `Record` is one entity in caller-facing form: field names as declared on
//! the object type, composite fields folded into nested objects. Storage rows
//! (column name to value) live in `tessera-storage`; the runner's formatter
//! converts between the two.

use crate::identity::{parse_record_id, RecordId, PRIMARY_KEY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;

/// One stored entity in canonical field-name/value form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, JsonValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary key, if present and well-formed.
    pub fn id(&self) -> Option<RecordId> {
        self.0
            .get(PRIMARY_KEY_FIELD)
            .and_then(JsonValue::as_str)
            .and_then(parse_record_id)
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.0.insert(field.into(), value)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.0.clone())
    }
}

impl From<Map<String, JsonValue>> for Record {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, JsonValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, JsonValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Immutable point-in-time copy of a record set.
///
/// Built once from the working records and never handed out mutably, so a
/// consumer holding a snapshot cannot observe later changes to those records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSnapshot {
    records: Vec<Record>,
}

impl RecordSnapshot {
    /// Deep-copy the given records.
    pub fn capture(records: &[Record]) -> Self {
        Self {
            records: records.to_vec(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Primary keys present in the snapshot.
    pub fn ids(&self) -> BTreeSet<RecordId> {
        self.records.iter().filter_map(Record::id).collect()
    }

    /// Find a record by primary key.
    pub fn find(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|record| record.id() == Some(id))
    }
}
