//! In-memory record store.

use crate::{Predicate, QueryState, RecordStore, StorageRow, StorageUpdatePayload};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tessera_core::{
    composite_column, is_valid_record_id, FieldKind, ObjectTypeDescriptor, RelationKind, StorageError,
    TesseraError, TesseraResult,
};
use tracing::debug;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Number,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Whether a non-null value can be stored in a column of this type.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ColumnType::Uuid => value.as_str().is_some_and(is_valid_record_id),
            ColumnType::Text => value.is_string(),
            ColumnType::Number => value.is_number(),
            ColumnType::Boolean => value.is_boolean(),
            ColumnType::Timestamp => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            ColumnType::Json => true,
        }
    }

    fn from_kind(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Uuid | FieldKind::Relation(_) => ColumnType::Uuid,
            FieldKind::Text | FieldKind::Select { .. } => ColumnType::Text,
            FieldKind::Number => ColumnType::Number,
            FieldKind::Boolean => ColumnType::Boolean,
            FieldKind::DateTime => ColumnType::Timestamp,
            FieldKind::MultiSelect { .. }
            | FieldKind::RawJson
            | FieldKind::Currency
            | FieldKind::FullName
            | FieldKind::Links => ColumnType::Json,
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    fn check(&self, table: &str, value: &JsonValue) -> Result<(), StorageError> {
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err(StorageError::UpdateFailed {
                table: table.to_string(),
                reason: format!("null value in column \"{}\" violates not-null constraint", self.name),
            });
        }
        if !self.column_type.accepts(value) {
            return Err(StorageError::UpdateFailed {
                table: table.to_string(),
                reason: format!(
                    "invalid input for column \"{}\" of type {:?}: {}",
                    self.name, self.column_type, value
                ),
            });
        }
        Ok(())
    }
}

/// Table layout derived from an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn from_descriptor(descriptor: &ObjectTypeDescriptor) -> Self {
        let mut columns = Vec::new();
        for field in &descriptor.fields {
            match &field.kind {
                FieldKind::Relation(RelationKind::OneToMany { .. }) => {}
                FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }) => {
                    columns.push(ColumnDef {
                        name: join_column.clone(),
                        column_type: ColumnType::Uuid,
                        nullable: field.nullable,
                    });
                }
                kind if kind.is_composite() => {
                    for sub_field in kind.composite_sub_fields().unwrap_or_default() {
                        let sub_kind = kind.sub_field_kind(sub_field).unwrap_or(FieldKind::Text);
                        columns.push(ColumnDef::new(
                            composite_column(&field.name, sub_field),
                            ColumnType::from_kind(&sub_kind),
                        ));
                    }
                }
                kind => columns.push(ColumnDef {
                    name: field.name.clone(),
                    column_type: ColumnType::from_kind(kind),
                    nullable: field.nullable,
                }),
            }
        }
        Self {
            name: descriptor.table_name.clone(),
            columns,
        }
    }

    fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<StorageRow>,
}

impl MemoryTable {
    fn check_row(&self, row: &StorageRow) -> Result<(), StorageError> {
        for (column, value) in row {
            let def = self.schema.column(column).ok_or_else(|| StorageError::UnknownColumn {
                table: self.schema.name.clone(),
                column: column.clone(),
            })?;
            def.check(&self.schema.name, value)?;
        }
        Ok(())
    }

    /// A predicate may only read declared columns.
    fn check_predicate(&self, predicate: &Predicate) -> Result<(), StorageError> {
        match predicate
            .columns()
            .into_iter()
            .find(|column| self.schema.column(column).is_none())
        {
            Some(column) => Err(StorageError::QueryFailed {
                table: self.schema.name.clone(),
                reason: format!("column \"{}\" does not exist", column),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory store with set-based update semantics.
///
/// Rows keep insertion order, which is the order reads and updates return
/// them in. Each update statement runs under a single write lock and checks
/// every assignment before touching any row.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, schema: TableSchema) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Create the table backing an object type.
    pub fn create_table_for(&self, descriptor: &ObjectTypeDescriptor) -> TesseraResult<()> {
        self.create_table(TableSchema::from_descriptor(descriptor))
    }

    /// Append a row. Unknown or ill-typed columns are rejected.
    pub fn insert_row(&self, table: &str, row: StorageRow) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let memory_table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        memory_table.check_row(&row)?;
        memory_table.rows.push(row);
        Ok(())
    }

    /// Copy of every row in a table.
    pub fn rows(&self, table: &str) -> TesseraResult<Vec<StorageRow>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(memory_table.rows.clone())
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> TesseraResult<usize> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let memory_table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(memory_table.rows.len())
    }

    /// Remove all rows from every table.
    pub fn clear(&self) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        for table in tables.values_mut() {
            table.rows.clear();
        }
        Ok(())
    }
}

fn table_not_found(table: &str) -> TesseraError {
    TesseraError::Storage(StorageError::TableNotFound {
        table: table.to_string(),
    })
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_many(&self, query: &QueryState) -> TesseraResult<Vec<StorageRow>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let memory_table = tables
            .get(query.table())
            .ok_or_else(|| table_not_found(query.table()))?;

        let predicate = query.predicate();
        memory_table.check_predicate(&predicate)?;
        let rows: Vec<StorageRow> = memory_table
            .rows
            .iter()
            .filter(|row| predicate.matches(row))
            .cloned()
            .collect();

        debug!(table = query.table(), rows = rows.len(), "find_many");
        Ok(rows)
    }

    async fn update_returning(
        &self,
        query: &QueryState,
        payload: &StorageUpdatePayload,
    ) -> TesseraResult<Vec<StorageRow>> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let memory_table = tables
            .get_mut(query.table())
            .ok_or_else(|| table_not_found(query.table()))?;

        if payload.is_empty() {
            return Err(StorageError::UpdateFailed {
                table: query.table().to_string(),
                reason: "update payload has no columns".to_string(),
            }
            .into());
        }

        // Check every assignment before mutating anything.
        for (column, value) in payload.columns() {
            let def = memory_table
                .schema
                .column(column)
                .ok_or_else(|| StorageError::UnknownColumn {
                    table: query.table().to_string(),
                    column: column.clone(),
                })?;
            def.check(query.table(), value)?;
        }

        let predicate = query.predicate();
        memory_table.check_predicate(&predicate)?;
        let mut returned = Vec::new();
        for row in memory_table.rows.iter_mut().filter(|row| predicate.matches(row)) {
            for (column, value) in payload.columns() {
                row.insert(column.clone(), value.clone());
            }
            returned.push(row.clone());
        }

        debug!(table = query.table(), rows = returned.len(), "update_returning");
        Ok(returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{new_record_id, FieldDescriptor};

    fn company() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("company", "companies")
            .with_field(FieldDescriptor::text("name"))
            .with_field(FieldDescriptor::select("status", ["OPEN", "DONE"]))
            .with_field(FieldDescriptor::number("employees"))
            .with_field(FieldDescriptor::currency("annualRevenue"))
    }

    fn row(id: &str, status: &str) -> StorageRow {
        [
            ("id".to_string(), json!(id)),
            ("status".to_string(), json!(status)),
        ]
        .into_iter()
        .collect()
    }

    fn seeded() -> (InMemoryRecordStore, Vec<String>) {
        let store = InMemoryRecordStore::new();
        store.create_table_for(&company()).unwrap();
        let ids: Vec<String> = (0..3).map(|_| new_record_id().to_string()).collect();
        for id in &ids {
            store.insert_row("company", row(id, "OPEN")).unwrap();
        }
        (store, ids)
    }

    #[test]
    fn test_table_schema_from_descriptor() {
        let schema = TableSchema::from_descriptor(&company());
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "name",
                "status",
                "employees",
                "annualRevenueAmountMicros",
                "annualRevenueCurrencyCode"
            ]
        );
        assert_eq!(schema.columns[4].column_type, ColumnType::Number);
        assert_eq!(schema.columns[5].column_type, ColumnType::Text);
        assert!(!schema.columns[0].nullable);
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let (store, _) = seeded();
        let mut bad = row(&new_record_id().to_string(), "OPEN");
        bad.insert("nope".to_string(), json!(1));
        assert!(store.insert_row("company", bad).is_err());
        assert_eq!(store.row_count("company").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_many_preserves_order() {
        let (store, ids) = seeded();
        let query = QueryState::new("company");
        let rows = store.find_many(&query).await.unwrap();
        let found: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(found, ids.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_update_returning_only_matching_rows() {
        let (store, ids) = seeded();
        let mut query = QueryState::new("company");
        query.and_where(Predicate::in_list(
            "id",
            vec![json!(ids[0]), json!(ids[2])],
        ));
        let payload: StorageUpdatePayload =
            [("status".to_string(), json!("DONE"))].into_iter().collect();

        let returned = store.update_returning(&query, &payload).await.unwrap();
        assert_eq!(returned.len(), 2);
        assert!(returned.iter().all(|r| r["status"] == json!("DONE")));

        let all = store.rows("company").unwrap();
        assert_eq!(all[1]["status"], json!("OPEN"));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_type_without_partial_write() {
        let (store, _) = seeded();
        let query = QueryState::new("company");
        let payload: StorageUpdatePayload = [
            ("status".to_string(), json!("DONE")),
            ("employees".to_string(), json!("many")),
        ]
        .into_iter()
        .collect();

        let result = store.update_returning(&query, &payload).await;
        assert!(matches!(
            result,
            Err(TesseraError::Storage(StorageError::UpdateFailed { .. }))
        ));
        assert!(store
            .rows("company")
            .unwrap()
            .iter()
            .all(|r| r["status"] == json!("OPEN")));
    }

    #[tokio::test]
    async fn test_update_rejects_null_in_required_column() {
        let (store, _) = seeded();
        let payload: StorageUpdatePayload =
            [("id".to_string(), JsonValue::Null)].into_iter().collect();
        let result = store
            .update_returning(&QueryState::new("company"), &payload)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_predicate_on_unknown_column_fails_without_write() {
        let (store, _) = seeded();
        let mut query = QueryState::new("company");
        query.and_where(Predicate::eq("nope", json!(1)));

        let read = store.find_many(&query).await;
        assert!(matches!(
            read,
            Err(TesseraError::Storage(StorageError::QueryFailed { .. }))
        ));

        let payload: StorageUpdatePayload =
            [("status".to_string(), json!("DONE"))].into_iter().collect();
        let write = store.update_returning(&query, &payload).await;
        assert!(matches!(
            write,
            Err(TesseraError::Storage(StorageError::QueryFailed { .. }))
        ));
        assert!(store
            .rows("company")
            .unwrap()
            .iter()
            .all(|r| r["status"] == json!("OPEN")));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let store = InMemoryRecordStore::new();
        let result = store.find_many(&QueryState::new("ghost")).await;
        assert!(matches!(
            result,
            Err(TesseraError::Storage(StorageError::TableNotFound { .. }))
        ));
    }
}
