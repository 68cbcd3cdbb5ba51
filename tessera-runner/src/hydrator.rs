//! Nested relation hydration.
//!
//! A hydrator takes ownership of a record list and hands it back with the
//! requested relations attached. It must return the same records, in the
//! same order; the runner relies on that to split the list afterwards.
//!
//! `StoreRelationHydrator` issues one store read per requested relation for
//! the whole record list, never one per record:
//!
//! ```text
//! many-to-one  person.company  ->  SELECT company WHERE id IN (<companyId of each person>)
//! one-to-many  company.people  ->  SELECT person  WHERE companyId IN (<id of each company>)
//! ```

use crate::auth::AuthContext;
use crate::connection::RecordConnection;
use crate::error::{RunnerError, RunnerResult};
use crate::formatter::format_output;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tessera_core::{
    ObjectTypeDescriptor, Record, RelationKind, SchemaRegistry, PRIMARY_KEY_FIELD,
};
use tessera_storage::{Predicate, QueryState, RecordStore, StorageRow};
use tracing::debug;

/// Tree of relation names to hydrate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationSelection {
    relations: BTreeMap<String, RelationSelection>,
}

static EMPTY_SELECTION: RelationSelection = RelationSelection {
    relations: BTreeMap::new(),
};

impl RelationSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a relation without nested relations.
    pub fn relation(self, name: impl Into<String>) -> Self {
        self.nested(name, RelationSelection::new())
    }

    /// Select a relation and relations of its target.
    pub fn nested(mut self, name: impl Into<String>, selection: RelationSelection) -> Self {
        self.relations.insert(name.into(), selection);
        self
    }

    /// Parse `{"people": true, "company": {"owner": true}}`.
    ///
    /// Keys mapped to `false` or `null` are skipped.
    pub fn from_json(value: &JsonValue) -> Self {
        let mut selection = Self::new();
        if let JsonValue::Object(map) = value {
            for (name, nested) in map {
                match nested {
                    JsonValue::Bool(false) | JsonValue::Null => {}
                    JsonValue::Object(_) => {
                        selection.relations.insert(name.clone(), Self::from_json(nested));
                    }
                    _ => {
                        selection.relations.insert(name.clone(), Self::new());
                    }
                }
            }
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RelationSelection)> {
        self.relations.iter()
    }

    /// Nesting depth; a flat selection has depth 1, an empty one 0.
    pub fn depth(&self) -> usize {
        self.relations
            .values()
            .map(|nested| 1 + nested.depth())
            .max()
            .unwrap_or(0)
    }
}

/// Everything a hydrator needs besides the records.
#[derive(Debug, Clone)]
pub struct HydrationRequest {
    pub descriptor: Arc<ObjectTypeDescriptor>,
    pub selection: RelationSelection,
    /// Maximum records attached per parent for one-to-many relations
    pub record_cap: usize,
    pub auth: AuthContext,
    /// Skip per-object read checks (trusted callers)
    pub bypass_permissions: bool,
}

/// Attaches related records.
#[async_trait]
pub trait RelationHydrator: Send + Sync {
    async fn hydrate(
        &self,
        records: Vec<Record>,
        request: &HydrationRequest,
    ) -> RunnerResult<Vec<Record>>;
}

type HydrateFuture<'a> = Pin<Box<dyn Future<Output = RunnerResult<Vec<Record>>> + Send + 'a>>;

/// Batched hydrator reading related records from a `RecordStore`.
#[derive(Clone)]
pub struct StoreRelationHydrator {
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn SchemaRegistry>,
    max_depth: usize,
}

impl StoreRelationHydrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn SchemaRegistry>,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            registry,
            max_depth,
        }
    }

    fn hydrate_level<'a>(
        &'a self,
        mut records: Vec<Record>,
        descriptor: &'a ObjectTypeDescriptor,
        selection: &'a RelationSelection,
        request: &'a HydrationRequest,
        depth: usize,
    ) -> HydrateFuture<'a> {
        Box::pin(async move {
            for (name, nested) in selection.iter() {
                let Some(relation) = descriptor.field(name).and_then(|f| f.kind.relation()) else {
                    debug!(object_type = %descriptor.name_singular, relation = %name, "Skipping unknown relation");
                    continue;
                };

                let target = self
                    .registry
                    .require(relation.target())
                    .map_err(|e| RunnerError::hydration_failed(e.to_string()))?;
                if !request.bypass_permissions && !request.auth.can_read(&target.name_singular) {
                    return Err(RunnerError::forbidden(format!(
                        "Not allowed to read {}",
                        target.name_plural
                    )));
                }

                let nested = if depth < self.max_depth {
                    nested
                } else {
                    if !nested.is_empty() {
                        debug!(relation = %name, depth, "Nested relations beyond maximum depth ignored");
                    }
                    &EMPTY_SELECTION
                };

                match relation {
                    RelationKind::ManyToOne { join_column, .. } => {
                        let ids: BTreeSet<String> = records
                            .iter()
                            .filter_map(|r| r.get(join_column).and_then(JsonValue::as_str))
                            .map(str::to_string)
                            .collect();
                        let rows = self
                            .load(&target, Predicate::in_list(PRIMARY_KEY_FIELD, to_values(ids)))
                            .await?;
                        let related = self
                            .hydrate_level(format_output(&rows, &target), &target, nested, request, depth + 1)
                            .await?;

                        let by_id: HashMap<String, JsonValue> = related
                            .iter()
                            .filter_map(|r| Some((r.id()?.to_string(), r.to_json())))
                            .collect();
                        for record in &mut records {
                            let value = record
                                .get(join_column)
                                .and_then(JsonValue::as_str)
                                .and_then(|id| by_id.get(id).cloned())
                                .unwrap_or(JsonValue::Null);
                            record.insert(name.clone(), value);
                        }
                    }
                    RelationKind::OneToMany {
                        inverse_join_column,
                        ..
                    } => {
                        let parent_ids: BTreeSet<String> =
                            records.iter().filter_map(Record::id).map(|id| id.to_string()).collect();
                        let rows = self
                            .load(&target, Predicate::in_list(inverse_join_column.clone(), to_values(parent_ids)))
                            .await?;
                        let parents: Vec<Option<String>> = rows
                            .iter()
                            .map(|row| {
                                row.get(inverse_join_column)
                                    .and_then(JsonValue::as_str)
                                    .map(str::to_string)
                            })
                            .collect();
                        let related = self
                            .hydrate_level(format_output(&rows, &target), &target, nested, request, depth + 1)
                            .await?;

                        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
                        for (parent, child) in parents.into_iter().zip(related) {
                            if let Some(parent) = parent {
                                grouped.entry(parent).or_default().push(child);
                            }
                        }
                        // A parent may appear more than once (before and after images).
                        for record in &mut records {
                            let mut children = record
                                .id()
                                .and_then(|id| grouped.get(&id.to_string()).cloned())
                                .unwrap_or_default();
                            let total = children.len();
                            children.truncate(request.record_cap);
                            let connection = serde_json::to_value(RecordConnection::page(children, total))
                                .map_err(|e| RunnerError::hydration_failed(e.to_string()))?;
                            record.insert(name.clone(), connection);
                        }
                    }
                }
            }
            Ok(records)
        })
    }

    async fn load(
        &self,
        target: &ObjectTypeDescriptor,
        predicate: Predicate,
    ) -> RunnerResult<Vec<StorageRow>> {
        let mut query = QueryState::new(target.table_name.clone());
        query.and_where(predicate);
        self.store
            .find_many(&query)
            .await
            .map_err(|e| RunnerError::hydration_failed(e.to_string()))
    }
}

fn to_values(ids: BTreeSet<String>) -> Vec<JsonValue> {
    ids.into_iter().map(JsonValue::String).collect()
}

#[async_trait]
impl RelationHydrator for StoreRelationHydrator {
    async fn hydrate(
        &self,
        records: Vec<Record>,
        request: &HydrationRequest,
    ) -> RunnerResult<Vec<Record>> {
        debug!(
            object_type = %request.descriptor.name_singular,
            records = records.len(),
            relations = request.selection.len(),
            "Hydrating relations"
        );
        self.hydrate_level(records, &request.descriptor, &request.selection, request, 1)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tessera_core::{new_record_id, FieldDescriptor, InMemorySchemaRegistry, RecordId};
    use tessera_storage::InMemoryRecordStore;
    use uuid::Uuid;

    fn company() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("company", "companies")
            .with_field(FieldDescriptor::text("name"))
            .with_field(FieldDescriptor::one_to_many("people", "person", "companyId"))
    }

    fn person() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("person", "people")
            .with_field(FieldDescriptor::text("email"))
            .with_field(FieldDescriptor::many_to_one("company", "company"))
    }

    struct Fixture {
        hydrator: StoreRelationHydrator,
        store: InMemoryRecordStore,
        company_ids: Vec<RecordId>,
    }

    fn fixture() -> Fixture {
        let registry = InMemorySchemaRegistry::from_descriptors([company(), person()]).unwrap();
        let store = InMemoryRecordStore::new();
        store.create_table_for(&company()).unwrap();
        store.create_table_for(&person()).unwrap();

        let company_ids = vec![new_record_id(), new_record_id()];
        for (i, id) in company_ids.iter().enumerate() {
            let row: StorageRow = [
                ("id".to_string(), json!(id.to_string())),
                ("name".to_string(), json!(format!("Company {}", i))),
            ]
            .into_iter()
            .collect();
            store.insert_row("company", row).unwrap();
        }
        // Three people at the first company, none at the second.
        for i in 0..3 {
            let row: StorageRow = [
                ("id".to_string(), json!(new_record_id().to_string())),
                ("email".to_string(), json!(format!("p{}@acme.test", i))),
                ("companyId".to_string(), json!(company_ids[0].to_string())),
            ]
            .into_iter()
            .collect();
            store.insert_row("person", row).unwrap();
        }

        Fixture {
            hydrator: StoreRelationHydrator::new(
                Arc::new(store.clone()),
                Arc::new(registry),
                3,
            ),
            store,
            company_ids,
        }
    }

    fn request(descriptor: ObjectTypeDescriptor, selection: RelationSelection) -> HydrationRequest {
        HydrationRequest {
            descriptor: Arc::new(descriptor),
            selection,
            record_cap: 2,
            auth: AuthContext::user(Uuid::now_v7(), "user-1"),
            bypass_permissions: false,
        }
    }

    #[test]
    fn test_selection_from_json() {
        let selection = RelationSelection::from_json(&json!({
            "people": {"company": true},
            "owner": true,
            "skipped": false
        }));
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.depth(), 2);
        assert!(RelationSelection::from_json(&json!(null)).is_empty());
    }

    #[tokio::test]
    async fn test_one_to_many_capped_and_grouped() {
        let f = fixture();
        let companies = format_output(&f.store.rows("company").unwrap(), &company());

        let hydrated = f
            .hydrator
            .hydrate(companies, &request(company(), RelationSelection::new().relation("people")))
            .await
            .unwrap();

        assert_eq!(hydrated.len(), 2);
        assert_eq!(hydrated[0].id(), Some(f.company_ids[0]));
        let people = hydrated[0].get("people").unwrap();
        assert_eq!(people["totalCount"], json!(3));
        assert_eq!(people["edges"].as_array().unwrap().len(), 2);
        assert_eq!(people["pageInfo"]["hasNextPage"], json!(true));

        let none = hydrated[1].get("people").unwrap();
        assert_eq!(none["totalCount"], json!(0));
    }

    #[tokio::test]
    async fn test_many_to_one_with_nested_relation() {
        let f = fixture();
        let people = format_output(&f.store.rows("person").unwrap(), &person());
        let selection = RelationSelection::new()
            .nested("company", RelationSelection::new().relation("people"));

        let hydrated = f.hydrator.hydrate(people, &request(person(), selection)).await.unwrap();

        assert_eq!(hydrated.len(), 3);
        for record in &hydrated {
            let company = record.get("company").unwrap();
            assert_eq!(company["id"], json!(f.company_ids[0].to_string()));
            assert_eq!(company["people"]["totalCount"], json!(3));
        }
    }

    #[tokio::test]
    async fn test_forbidden_without_bypass() {
        let f = fixture();
        let people = format_output(&f.store.rows("person").unwrap(), &person());
        let mut req = request(person(), RelationSelection::new().relation("company"));
        req.auth = req.auth.with_readable_object_types(["person"]);

        let err = f.hydrator.hydrate(people.clone(), &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        req.bypass_permissions = true;
        assert!(f.hydrator.hydrate(people, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_depth_limit_truncates_selection() {
        let f = fixture();
        let hydrator = StoreRelationHydrator::new(
            Arc::new(f.store.clone()),
            Arc::new(InMemorySchemaRegistry::from_descriptors([company(), person()]).unwrap()),
            1,
        );
        let people = format_output(&f.store.rows("person").unwrap(), &person());
        let selection = RelationSelection::new()
            .nested("company", RelationSelection::new().relation("people"));

        let hydrated = hydrator.hydrate(people, &request(person(), selection)).await.unwrap();
        let company = hydrated[0].get("company").unwrap();
        assert!(company.get("name").is_some());
        assert!(company.get("people").is_none());
    }

    #[tokio::test]
    async fn test_unknown_relation_skipped() {
        let f = fixture();
        let people = format_output(&f.store.rows("person").unwrap(), &person());
        let hydrated = f
            .hydrator
            .hydrate(people.clone(), &request(person(), RelationSelection::new().relation("pets")))
            .await
            .unwrap();
        assert_eq!(hydrated, people);
    }
}
