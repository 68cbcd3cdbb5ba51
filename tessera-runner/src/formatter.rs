//! Canonical record <-> storage row formatting.
//!
//! Both directions are total: fields or columns the object type does not
//! declare are dropped, never reported.

use crate::coerce::coerce_value;
use serde_json::{Map, Value as JsonValue};
use tessera_core::{
    composite_column, FieldDescriptor, FieldKind, ObjectTypeDescriptor, Record, RelationKind,
};
use tessera_storage::{StorageRow, StorageUpdatePayload};
use tracing::debug;

/// Caller's update payload: field name to new value.
pub type UpdatePayload = Map<String, JsonValue>;

/// Map caller field names and values onto storage columns and values.
pub fn format_input(payload: &UpdatePayload, descriptor: &ObjectTypeDescriptor) -> StorageUpdatePayload {
    let mut out = StorageUpdatePayload::new();
    for (key, value) in payload {
        match descriptor.field(key) {
            Some(field) => format_field(field, value, &mut out),
            None if descriptor.field_by_join_column(key).is_some() => {
                out.set(key.clone(), coerce_value(&FieldKind::Uuid, value));
            }
            None => {
                debug!(object_type = %descriptor.name_singular, field = %key, "Dropping unknown update field");
            }
        }
    }
    out
}

fn format_field(field: &FieldDescriptor, value: &JsonValue, out: &mut StorageUpdatePayload) {
    match &field.kind {
        kind if kind.is_composite() => {
            let sub_fields = kind.composite_sub_fields().unwrap_or_default();
            match value {
                JsonValue::Null => {
                    for sub in sub_fields {
                        out.set(composite_column(&field.name, sub), JsonValue::Null);
                    }
                }
                JsonValue::Object(parts) => {
                    for sub in sub_fields {
                        if let Some(part) = parts.get(*sub) {
                            let sub_kind = kind.sub_field_kind(sub).unwrap_or(FieldKind::Text);
                            out.set(composite_column(&field.name, sub), coerce_value(&sub_kind, part));
                        }
                    }
                }
                _ => {
                    debug!(field = %field.name, "Dropping non-object composite value");
                }
            }
        }
        FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }) => {
            // Accept either the bare id or `{ "id": ... }`.
            let id = match value {
                JsonValue::Object(map) => match map.get("id") {
                    Some(id) => id,
                    None => {
                        debug!(field = %field.name, "Dropping relation object without id");
                        return;
                    }
                },
                other => other,
            };
            out.set(join_column.clone(), coerce_value(&FieldKind::Uuid, id));
        }
        FieldKind::Relation(RelationKind::OneToMany { .. }) => {
            debug!(field = %field.name, "Dropping one-to-many relation from update");
        }
        kind => out.set(field.name.clone(), coerce_value(kind, value)),
    }
}

/// Map storage rows back to canonical records, preserving row order.
pub fn format_output(rows: &[StorageRow], descriptor: &ObjectTypeDescriptor) -> Vec<Record> {
    rows.iter().map(|row| format_row(row, descriptor)).collect()
}

fn format_row(row: &StorageRow, descriptor: &ObjectTypeDescriptor) -> Record {
    let mut record = Record::new();
    for field in &descriptor.fields {
        match &field.kind {
            kind if kind.is_composite() => {
                let sub_fields = kind.composite_sub_fields().unwrap_or_default();
                let mut parts = Map::new();
                for sub in sub_fields {
                    if let Some(value) = row.get(&composite_column(&field.name, sub)) {
                        parts.insert(sub.to_string(), value.clone());
                    }
                }
                if !parts.is_empty() {
                    record.insert(field.name.clone(), JsonValue::Object(parts));
                }
            }
            FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }) => {
                if let Some(value) = row.get(join_column) {
                    record.insert(join_column.clone(), value.clone());
                }
            }
            FieldKind::Relation(RelationKind::OneToMany { .. }) => {}
            _ => {
                if let Some(value) = row.get(&field.name) {
                    record.insert(field.name.clone(), value.clone());
                }
            }
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn company() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("company", "companies")
            .with_field(FieldDescriptor::text("name"))
            .with_field(FieldDescriptor::select("status", ["OPEN", "DONE"]))
            .with_field(FieldDescriptor::date_time("closedAt"))
            .with_field(FieldDescriptor::currency("annualRevenue"))
            .with_field(FieldDescriptor::many_to_one("owner", "person"))
            .with_field(FieldDescriptor::one_to_many("people", "person", "companyId"))
    }

    fn payload(value: JsonValue) -> UpdatePayload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_format_input_scalars_and_select() {
        let out = format_input(
            &payload(json!({"name": "Acme", "status": "done", "closedAt": "2024-01-02"})),
            &company(),
        );
        assert_eq!(out.get("name"), Some(&json!("Acme")));
        assert_eq!(out.get("status"), Some(&json!("DONE")));
        assert_eq!(out.get("closedAt"), Some(&json!("2024-01-02T00:00:00.000Z")));
    }

    #[test]
    fn test_format_input_composite_split() {
        let out = format_input(
            &payload(json!({"annualRevenue": {"amountMicros": "5000000", "currencyCode": "EUR"}})),
            &company(),
        );
        assert_eq!(out.get("annualRevenueAmountMicros"), Some(&json!(5000000)));
        assert_eq!(out.get("annualRevenueCurrencyCode"), Some(&json!("EUR")));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_format_input_partial_composite_and_null() {
        let out = format_input(
            &payload(json!({"annualRevenue": {"currencyCode": "USD"}})),
            &company(),
        );
        assert_eq!(out.len(), 1);

        let out = format_input(&payload(json!({"annualRevenue": null})), &company());
        assert_eq!(out.get("annualRevenueAmountMicros"), Some(&JsonValue::Null));
        assert_eq!(out.get("annualRevenueCurrencyCode"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_format_input_relations() {
        let id = "0190a5f2-7b3c-7d4e-8f00-112233445566";
        assert_eq!(
            format_input(&payload(json!({"ownerId": id})), &company()).get("ownerId"),
            Some(&json!(id))
        );
        assert_eq!(
            format_input(&payload(json!({"owner": {"id": id}})), &company()).get("ownerId"),
            Some(&json!(id))
        );
        assert!(format_input(&payload(json!({"people": []})), &company()).is_empty());
    }

    #[test]
    fn test_many_to_one_without_id_is_dropped() {
        let out = format_input(
            &payload(json!({"name": "Acme", "owner": {"name": "Ada"}})),
            &company(),
        );
        assert_eq!(out.len(), 1);
        assert!(out.get("ownerId").is_none());

        let cleared = format_input(&payload(json!({"owner": {"id": null}})), &company());
        assert_eq!(cleared.get("ownerId"), Some(&JsonValue::Null));
        let cleared = format_input(&payload(json!({"owner": null})), &company());
        assert_eq!(cleared.get("ownerId"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_format_input_drops_unknown_fields() {
        let out = format_input(&payload(json!({"name": "Acme", "bogus": 1})), &company());
        assert_eq!(out.len(), 1);
        assert!(out.get("bogus").is_none());
    }

    #[test]
    fn test_format_output_folds_composites() {
        let row: StorageRow = [
            ("id", json!("0190a5f2-7b3c-7d4e-8f00-112233445566")),
            ("name", json!("Acme")),
            ("annualRevenueAmountMicros", json!(5)),
            ("annualRevenueCurrencyCode", json!("EUR")),
            ("ownerId", JsonValue::Null),
            ("leftover", json!("x")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let records = format_output(&[row], &company());
        let record = &records[0];
        assert_eq!(
            record.get("annualRevenue"),
            Some(&json!({"amountMicros": 5, "currencyCode": "EUR"}))
        );
        assert_eq!(record.get("ownerId"), Some(&JsonValue::Null));
        assert!(record.get("leftover").is_none());
        assert!(record.get("people").is_none());
        assert!(record.id().is_some());
    }
}
