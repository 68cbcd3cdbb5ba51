//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Fixtures: object types, a seeded in-memory store, a wired-up runner
//! - Spy and failing collaborators
//! - Proptest generators
//! - Assertions on `RunnerResult`

pub use tessera_core::{
    new_record_id, FieldDescriptor, FilterExpr, InMemorySchemaRegistry, ObjectTypeDescriptor,
    Record, RecordId, RecordSnapshot, SchemaRegistry, StorageError, TesseraResult,
};
pub use tessera_events::{ChangeEvent, ChangeEventBus, EventBusError};
pub use tessera_runner::{
    AuthContext, ErrorCode, HydrationRequest, RecordConnection, RelationHydrator,
    RelationSelection, RunnerConfig, RunnerError, RunnerResult, StoreRelationHydrator,
    UpdateManyArgs, UpdateManyRunner,
};
pub use tessera_storage::{
    InMemoryRecordStore, QueryState, RecordStore, StorageRow, StorageUpdatePayload,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SPY / FAILING COLLABORATORS
// ============================================================================

type UpdateHook = Box<dyn FnOnce() + Send>;

/// Record store wrapper counting reads and writes.
///
/// Can be told to fail every update, or to run a hook right before the next
/// update reaches the inner store (to simulate a concurrent writer).
pub struct SpyRecordStore {
    inner: Arc<dyn RecordStore>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_updates: AtomicBool,
    before_update: Mutex<Option<UpdateHook>>,
}

impl SpyRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
            before_update: Mutex::new(None),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn before_next_update(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.before_update) = Some(Box::new(hook));
    }
}

#[async_trait]
impl RecordStore for SpyRecordStore {
    async fn find_many(&self, query: &QueryState) -> TesseraResult<Vec<StorageRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_many(query).await
    }

    async fn update_returning(
        &self,
        query: &QueryState,
        payload: &StorageUpdatePayload,
    ) -> TesseraResult<Vec<StorageRow>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let hook = lock(&self.before_update).take();
        if let Some(hook) = hook {
            hook();
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::UpdateFailed {
                table: query.table().to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.inner.update_returning(query, payload).await
    }
}

/// Event bus keeping every published event.
#[derive(Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChangeEventBus for RecordingEventBus {
    async fn publish(&self, event: ChangeEvent) -> Result<(), EventBusError> {
        lock(&self.events).push(event);
        Ok(())
    }
}

/// Event bus rejecting every event.
#[derive(Debug, Default)]
pub struct FailingEventBus;

#[async_trait]
impl ChangeEventBus for FailingEventBus {
    async fn publish(&self, event: ChangeEvent) -> Result<(), EventBusError> {
        Err(EventBusError::Rejected {
            event_name: event.name,
            reason: "injected failure".to_string(),
        })
    }
}

/// Hydrator failing every call, counting attempts.
#[derive(Debug, Default)]
pub struct FailingHydrator {
    calls: AtomicUsize,
}

impl FailingHydrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationHydrator for FailingHydrator {
    async fn hydrate(
        &self,
        _records: Vec<Record>,
        _request: &HydrationRequest,
    ) -> RunnerResult<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RunnerError::hydration_failed("injected failure"))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Object types, seeded stores and a wired-up runner.

    use super::*;
    use serde_json::json;

    pub const COMPANY_STATUSES: &[&str] = &["OPEN", "IN_PROGRESS", "DONE"];

    pub fn company_type() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("company", "companies")
            .with_table("_company")
            .with_field(FieldDescriptor::text("name"))
            .with_field(FieldDescriptor::select("status", COMPANY_STATUSES.iter().copied()))
            .with_field(FieldDescriptor::number("employees"))
            .with_field(FieldDescriptor::currency("annualRevenue"))
            .with_field(FieldDescriptor::links("domain"))
            .with_field(FieldDescriptor::date_time("closedAt"))
            .with_field(FieldDescriptor::one_to_many("people", "person", "companyId"))
    }

    pub fn person_type() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("person", "people")
            .with_table("_person")
            .with_field(FieldDescriptor::full_name("name"))
            .with_field(FieldDescriptor::text("email"))
            .with_field(FieldDescriptor::number("age"))
            .with_field(FieldDescriptor::many_to_one("company", "company"))
    }

    /// Read-only object type backed by a remote source.
    pub fn remote_invoice_type() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("invoice", "invoices")
            .remote()
            .with_field(FieldDescriptor::text("number"))
    }

    pub fn registry() -> Arc<InMemorySchemaRegistry> {
        match InMemorySchemaRegistry::from_descriptors([
            company_type(),
            person_type(),
            remote_invoice_type(),
        ]) {
            Ok(registry) => Arc::new(registry),
            Err(e) => panic!("fixture registry is inconsistent: {}", e),
        }
    }

    pub fn company_row(id: RecordId, name: &str, status: &str) -> StorageRow {
        [
            ("id", json!(id.to_string())),
            ("name", json!(name)),
            ("status", json!(status)),
            ("employees", json!(10)),
            ("annualRevenueAmountMicros", json!(1_000_000)),
            ("annualRevenueCurrencyCode", json!("USD")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    pub fn person_row(id: RecordId, email: &str, company_id: RecordId) -> StorageRow {
        [
            ("id", json!(id.to_string())),
            ("nameFirstName", json!("Ada")),
            ("nameLastName", json!("Lovelace")),
            ("email", json!(email)),
            ("companyId", json!(company_id.to_string())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// In-memory store with companies and their people.
    pub struct SeededStore {
        pub store: InMemoryRecordStore,
        pub company_ids: Vec<RecordId>,
        pub person_ids: Vec<RecordId>,
    }

    impl SeededStore {
        pub fn companies(&self) -> Vec<StorageRow> {
            self.store.rows(&company_type().table_name).unwrap_or_default()
        }

        pub fn company(&self, id: RecordId) -> Option<StorageRow> {
            let id = id.to_string();
            self.companies()
                .into_iter()
                .find(|row| row.get("id").and_then(|v| v.as_str()) == Some(id.as_str()))
        }
    }

    /// `companies` companies with status `OPEN`, each with
    /// `people_per_company` people.
    pub fn seeded_store(companies: usize, people_per_company: usize) -> TesseraResult<SeededStore> {
        let store = InMemoryRecordStore::new();
        let company = company_type();
        let person = person_type();
        store.create_table_for(&company)?;
        store.create_table_for(&person)?;
        store.create_table_for(&remote_invoice_type())?;

        let mut company_ids = Vec::with_capacity(companies);
        let mut person_ids = Vec::new();
        for c in 0..companies {
            let company_id = new_record_id();
            store.insert_row(
                &company.table_name,
                company_row(company_id, &format!("Company {}", c), "OPEN"),
            )?;
            company_ids.push(company_id);

            for p in 0..people_per_company {
                let person_id = new_record_id();
                store.insert_row(
                    &person.table_name,
                    person_row(person_id, &format!("p{}.{}@example.test", c, p), company_id),
                )?;
                person_ids.push(person_id);
            }
        }

        Ok(SeededStore {
            store,
            company_ids,
            person_ids,
        })
    }

    /// Runner over a seeded store with spy collaborators.
    pub struct TestHarness {
        pub runner: UpdateManyRunner,
        pub seeded: SeededStore,
        pub spy: Arc<SpyRecordStore>,
        pub events: Arc<RecordingEventBus>,
    }

    impl TestHarness {
        pub fn company_ids(&self) -> &[RecordId] {
            &self.seeded.company_ids
        }
    }

    pub fn harness(companies: usize, people_per_company: usize) -> TesseraResult<TestHarness> {
        harness_with(companies, people_per_company, None, RunnerConfig::default())
    }

    /// Harness with an optional replacement hydrator. Without one, a
    /// `StoreRelationHydrator` reads through the spy store.
    pub fn harness_with(
        companies: usize,
        people_per_company: usize,
        hydrator: Option<Arc<dyn RelationHydrator>>,
        config: RunnerConfig,
    ) -> TesseraResult<TestHarness> {
        let seeded = seeded_store(companies, people_per_company)?;
        let registry = registry();
        let spy = Arc::new(SpyRecordStore::new(Arc::new(seeded.store.clone())));
        let events = Arc::new(RecordingEventBus::new());
        let hydrator = hydrator.unwrap_or_else(|| {
            Arc::new(StoreRelationHydrator::new(
                spy.clone(),
                registry.clone(),
                config.max_hydration_depth,
            ))
        });
        let runner = UpdateManyRunner::new(registry, spy.clone(), events.clone(), hydrator, config);
        Ok(TestHarness {
            runner,
            seeded,
            spy,
            events,
        })
    }

    pub fn api_key_auth() -> AuthContext {
        AuthContext::api_key(uuid::Uuid::now_v7(), "test-key")
    }

    pub fn user_auth() -> AuthContext {
        AuthContext::user(uuid::Uuid::now_v7(), "test-user")
    }

    /// `{"id": {"in": [...]}}`
    pub fn id_filter(ids: &[RecordId]) -> serde_json::Value {
        json!({ "id": { "in": ids.iter().map(|id| id.to_string()).collect::<Vec<_>>() } })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for update payloads and filters.

    use super::fixtures::COMPANY_STATUSES;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value as JsonValue};

    /// A declared status option in random letter case.
    pub fn arb_status_spelling() -> impl Strategy<Value = (String, String)> {
        (prop::sample::select(COMPANY_STATUSES), any::<u64>()).prop_map(|(status, seed)| {
            let spelled: String = status
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    if seed >> (i % 64) & 1 == 1 {
                        c.to_ascii_lowercase()
                    } else {
                        c
                    }
                })
                .collect();
            (status.to_string(), spelled)
        })
    }

    pub fn arb_company_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,12}( [A-Z][a-z]{2,8})?"
    }

    /// Non-empty partial company payload over scalar fields.
    pub fn arb_company_payload() -> impl Strategy<Value = Map<String, JsonValue>> {
        (
            prop::option::of(arb_company_name()),
            prop::option::of(prop::sample::select(COMPANY_STATUSES)),
            prop::option::of(0i64..100_000),
        )
            .prop_filter("payload must not be empty", |(n, s, e)| {
                n.is_some() || s.is_some() || e.is_some()
            })
            .prop_map(|(name, status, employees)| {
                let mut map = Map::new();
                if let Some(name) = name {
                    map.insert("name".into(), json!(name));
                }
                if let Some(status) = status {
                    map.insert("status".into(), json!(status));
                }
                if let Some(employees) = employees {
                    map.insert("employees".into(), json!(employees));
                }
                map
            })
    }

    /// Strings that are not canonical hyphenated UUIDs.
    pub fn arb_invalid_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,20}",
            "[0-9a-f]{32}",
            "\\{[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\\}",
            "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{11}",
        ]
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on pipeline results.

    use super::*;

    /// Assert that a result failed with `code`.
    #[track_caller]
    pub fn assert_error_code<T: std::fmt::Debug>(result: &RunnerResult<T>, code: ErrorCode) {
        match result {
            Err(err) if err.code == code => {}
            other => panic!("Expected {:?}, got: {:?}", code, other),
        }
    }

    /// Ids of the nodes in a list of single-record connections.
    pub fn connection_ids(connections: &[RecordConnection]) -> Vec<RecordId> {
        connections
            .iter()
            .flat_map(|c| c.nodes())
            .filter_map(Record::id)
            .collect()
    }
}
