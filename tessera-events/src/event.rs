//! Change event types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::{ObjectTypeDescriptor, Record, RecordId, RecordSnapshot, Timestamp};
use uuid::Uuid;

/// Who performed the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub workspace_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
}

/// Batch-level update event.
///
/// `updated_fields` lists the field names the caller sent, not the fields
/// whose values actually changed; `record_events` derives the real diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_id: Uuid,
    /// `<objectSingular>.updated`
    pub name: String,
    pub occurred_at: Timestamp,
    pub object_type: Arc<ObjectTypeDescriptor>,
    pub actor: Actor,
    pub existing_records: RecordSnapshot,
    pub records: RecordSnapshot,
    pub updated_fields: Vec<String>,
}

impl ChangeEvent {
    pub fn updated(
        object_type: Arc<ObjectTypeDescriptor>,
        actor: Actor,
        existing_records: RecordSnapshot,
        records: RecordSnapshot,
        updated_fields: Vec<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            name: format!("{}.updated", object_type.name_singular),
            occurred_at: Utc::now(),
            object_type,
            actor,
            existing_records,
            records,
            updated_fields,
        }
    }

    /// Split into one event per updated record, in update order.
    pub fn record_events(&self) -> Vec<RecordUpdateEvent> {
        self.records
            .records()
            .iter()
            .filter_map(|after| {
                let record_id = after.id()?;
                let before = self.existing_records.find(record_id).cloned();
                let diff = before
                    .as_ref()
                    .map(|before| diff_records(before, after))
                    .unwrap_or_default();
                Some(RecordUpdateEvent {
                    record_id,
                    before,
                    after: after.clone(),
                    updated_fields: self.updated_fields.clone(),
                    diff,
                })
            })
            .collect()
    }
}

/// One field's value before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub before: JsonValue,
    pub after: JsonValue,
}

/// Per-record slice of a `ChangeEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdateEvent {
    pub record_id: RecordId,
    /// Missing when the record was not in the existence snapshot.
    pub before: Option<Record>,
    pub after: Record,
    pub updated_fields: Vec<String>,
    pub diff: BTreeMap<String, FieldDiff>,
}

fn diff_records(before: &Record, after: &Record) -> BTreeMap<String, FieldDiff> {
    let fields: BTreeSet<&String> = before.fields().chain(after.fields()).map(|(k, _)| k).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let old = before.get(field).cloned().unwrap_or(JsonValue::Null);
            let new = after.get(field).cloned().unwrap_or(JsonValue::Null);
            (old != new).then(|| {
                (
                    field.clone(),
                    FieldDiff {
                        before: old,
                        after: new,
                    },
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{new_record_id, FieldDescriptor};

    fn record(id: RecordId, status: &str, name: &str) -> Record {
        [
            ("id".to_string(), json!(id.to_string())),
            ("status".to_string(), json!(status)),
            ("name".to_string(), json!(name)),
        ]
        .into_iter()
        .collect()
    }

    fn company() -> Arc<ObjectTypeDescriptor> {
        Arc::new(
            ObjectTypeDescriptor::new("company", "companies")
                .with_field(FieldDescriptor::text("name"))
                .with_field(FieldDescriptor::select("status", ["OPEN", "DONE"])),
        )
    }

    #[test]
    fn test_event_name_and_id() {
        let event = ChangeEvent::updated(
            company(),
            Actor::default(),
            RecordSnapshot::default(),
            RecordSnapshot::default(),
            vec![],
        );
        assert_eq!(event.name, "company.updated");
        assert_eq!(event.event_id.get_version_num(), 7);
    }

    #[test]
    fn test_record_events_diff_only_changed_fields() {
        let a = new_record_id();
        let b = new_record_id();
        let before = vec![record(a, "OPEN", "Acme"), record(b, "DONE", "Globex")];
        let after = vec![record(a, "DONE", "Acme"), record(b, "DONE", "Globex")];

        let event = ChangeEvent::updated(
            company(),
            Actor::default(),
            RecordSnapshot::capture(&before),
            RecordSnapshot::capture(&after),
            vec!["status".to_string()],
        );
        let per_record = event.record_events();

        assert_eq!(per_record.len(), 2);
        assert_eq!(per_record[0].record_id, a);
        assert_eq!(
            per_record[0].diff.get("status"),
            Some(&FieldDiff {
                before: json!("OPEN"),
                after: json!("DONE")
            })
        );
        assert_eq!(per_record[0].diff.len(), 1);
        // Sent but unchanged: listed in updated_fields, absent from diff.
        assert!(per_record[1].diff.is_empty());
        assert_eq!(per_record[1].updated_fields, vec!["status"]);
    }

    #[test]
    fn test_record_event_without_before() {
        let a = new_record_id();
        let event = ChangeEvent::updated(
            company(),
            Actor::default(),
            RecordSnapshot::default(),
            RecordSnapshot::capture(&[record(a, "DONE", "Acme")]),
            vec!["status".to_string()],
        );
        let per_record = event.record_events();
        assert!(per_record[0].before.is_none());
        assert!(per_record[0].diff.is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let event = ChangeEvent::updated(
            company(),
            Actor::default(),
            RecordSnapshot::default(),
            RecordSnapshot::default(),
            vec!["status".to_string()],
        );
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("existingRecords").is_some());
        assert_eq!(value["updatedFields"], json!(["status"]));
    }
}
