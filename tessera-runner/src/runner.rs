//! The batch update pipeline.
//!
//! ```text
//! Validating -> SnapshottingExisting -> Mutating -> Formatting
//!            -> EmittingEvent -> HydratingRelations? -> Shaping -> Done
//! ```
//!
//! The existence read and the update are two statements with no shared
//! transaction. A row that stops matching between them is simply not
//! updated; one that starts matching is updated without appearing in the
//! "before" snapshot. The executor logs either case.

use crate::auth::AuthContext;
use crate::config::RunnerConfig;
use crate::connection::{shape_connections, RecordConnection};
use crate::error::{RunnerError, RunnerResult};
use crate::executor::execute_update;
use crate::filter_translator::apply_filter;
use crate::formatter::{format_input, format_output, UpdatePayload};
use crate::hydrator::{HydrationRequest, RelationHydrator, RelationSelection};
use crate::snapshot::capture_existing;
use crate::validation::validate_update_many;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tessera_core::{RecordSnapshot, SchemaRegistry};
use tessera_events::{ChangeEvent, ChangeEventBus};
use tessera_storage::{QueryState, RecordStore};
use tracing::{debug, info};

/// Pipeline stage, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateManyStage {
    Validating,
    SnapshottingExisting,
    Mutating,
    Formatting,
    EmittingEvent,
    HydratingRelations,
    Shaping,
    Done,
}

impl fmt::Display for UpdateManyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateManyStage::Validating => "validating",
            UpdateManyStage::SnapshottingExisting => "snapshotting_existing",
            UpdateManyStage::Mutating => "mutating",
            UpdateManyStage::Formatting => "formatting",
            UpdateManyStage::EmittingEvent => "emitting_event",
            UpdateManyStage::HydratingRelations => "hydrating_relations",
            UpdateManyStage::Shaping => "shaping",
            UpdateManyStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Fields the caller asked to get back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedFields {
    pub relations: Option<RelationSelection>,
}

impl SelectedFields {
    pub fn with_relations(relations: RelationSelection) -> Self {
        Self {
            relations: Some(relations),
        }
    }

    fn requested_relations(&self) -> Option<&RelationSelection> {
        self.relations.as_ref().filter(|r| !r.is_empty())
    }
}

/// Arguments of one batch update call.
#[derive(Debug, Clone)]
pub struct UpdateManyArgs {
    /// Caller filter in its JSON form. `None` fails with `MissingFilter`.
    pub filter: Option<JsonValue>,
    pub data: UpdatePayload,
    pub selected_fields: SelectedFields,
    pub auth: AuthContext,
    /// Singular name of the target object type
    pub object_type: String,
}

impl UpdateManyArgs {
    pub fn new(object_type: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            filter: None,
            data: UpdatePayload::new(),
            selected_fields: SelectedFields::default(),
            auth,
            object_type: object_type.into(),
        }
    }

    pub fn with_filter(mut self, filter: JsonValue) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the payload from a JSON object. Non-object values give an empty
    /// payload, which validation rejects.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = match data {
            JsonValue::Object(map) => map,
            _ => UpdatePayload::new(),
        };
        self
    }

    pub fn with_relations(mut self, relations: RelationSelection) -> Self {
        self.selected_fields = SelectedFields::with_relations(relations);
        self
    }
}

/// Runs batch updates against injected collaborators.
///
/// Holds no per-call state, so one instance serves concurrent callers.
#[derive(Clone)]
pub struct UpdateManyRunner {
    registry: Arc<dyn SchemaRegistry>,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn ChangeEventBus>,
    hydrator: Arc<dyn RelationHydrator>,
    config: RunnerConfig,
}

impl UpdateManyRunner {
    pub fn new(
        registry: Arc<dyn SchemaRegistry>,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn ChangeEventBus>,
        hydrator: Arc<dyn RelationHydrator>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            hydrator,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Update every record matching the filter and return one connection
    /// per updated record, in the order the store returned them.
    pub async fn run(&self, args: UpdateManyArgs) -> RunnerResult<Vec<RecordConnection>> {
        let object_type = args.object_type.as_str();

        enter(object_type, UpdateManyStage::Validating);
        let descriptor = self.registry.require(object_type)?;
        let filter = validate_update_many(
            &descriptor,
            args.filter.as_ref(),
            &args.data,
            self.config.max_filter_depth,
        )?;
        let storage_payload = format_input(&args.data, &descriptor);
        if storage_payload.is_empty() {
            return Err(RunnerError::invalid_input(format!(
                "Update payload has no fields declared on {}",
                descriptor.name_singular
            )));
        }
        let mut query = QueryState::new(descriptor.table_name.clone());

        enter(object_type, UpdateManyStage::SnapshottingExisting);
        let existing = capture_existing(self.store.as_ref(), &query, &filter, &descriptor).await?;
        let existing_snapshot = RecordSnapshot::capture(&existing);

        enter(object_type, UpdateManyStage::Mutating);
        apply_filter(&mut query, &filter, &descriptor)?;
        let rows = execute_update(
            self.store.as_ref(),
            &query,
            &storage_payload,
            &existing_snapshot.ids(),
        )
        .await?;

        enter(object_type, UpdateManyStage::Formatting);
        let updated = format_output(&rows, &descriptor);

        enter(object_type, UpdateManyStage::EmittingEvent);
        let event = ChangeEvent::updated(
            descriptor.clone(),
            args.auth.actor(),
            existing_snapshot,
            RecordSnapshot::capture(&updated),
            args.data.keys().cloned().collect(),
        );
        self.events.publish(event).await?;

        let updated = match args.selected_fields.requested_relations() {
            Some(selection) => {
                enter(object_type, UpdateManyStage::HydratingRelations);
                let request = HydrationRequest {
                    descriptor: descriptor.clone(),
                    selection: selection.clone(),
                    record_cap: self.config.relation_record_cap,
                    auth: args.auth.clone(),
                    bypass_permissions: args.auth.is_trusted_caller(),
                };
                let updated_count = updated.len();
                let mut union = existing;
                union.extend(updated);
                let mut hydrated = self.hydrator.hydrate(union, &request).await?;
                if hydrated.len() < updated_count {
                    return Err(RunnerError::hydration_failed(
                        "Hydrator returned fewer records than it was given",
                    ));
                }
                hydrated.split_off(hydrated.len() - updated_count)
            }
            None => updated,
        };

        enter(object_type, UpdateManyStage::Shaping);
        let connections = shape_connections(updated);

        enter(object_type, UpdateManyStage::Done);
        info!(
            object_type = %descriptor.name_singular,
            records = connections.len(),
            "Batch update completed"
        );
        Ok(connections)
    }
}

fn enter(object_type: &str, stage: UpdateManyStage) {
    debug!(object_type, stage = %stage, "updateMany stage");
}
