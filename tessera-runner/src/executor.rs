//! Set-based update execution.

use crate::error::{RunnerError, RunnerResult};
use std::collections::BTreeSet;
use tessera_core::{parse_record_id, RecordId, PRIMARY_KEY_FIELD};
use tessera_storage::{QueryState, RecordStore, StorageRow, StorageUpdatePayload};
use tracing::{debug, error, warn};

/// Run one `UPDATE ... RETURNING` over the filtered query.
///
/// The snapshot and the update are separate statements, so rows can appear
/// or disappear in between. When the returned identities differ from
/// `expected_ids` the difference is logged and the returned rows win.
pub async fn execute_update(
    store: &dyn RecordStore,
    query: &QueryState,
    payload: &StorageUpdatePayload,
    expected_ids: &BTreeSet<RecordId>,
) -> RunnerResult<Vec<StorageRow>> {
    let rows = store.update_returning(query, payload).await.map_err(|e| {
        error!(table = query.table(), error = %e, "Update statement failed");
        RunnerError::mutation_failed(e.to_string())
    })?;

    let returned_ids = row_ids(&rows);
    if &returned_ids != expected_ids {
        warn!(
            table = query.table(),
            expected = expected_ids.len(),
            returned = returned_ids.len(),
            missing = expected_ids.difference(&returned_ids).count(),
            unexpected = returned_ids.difference(expected_ids).count(),
            "Updated rows differ from existence snapshot"
        );
    }

    debug!(table = query.table(), rows = rows.len(), "Update applied");
    Ok(rows)
}

fn row_ids(rows: &[StorageRow]) -> BTreeSet<RecordId> {
    rows.iter()
        .filter_map(|row| row.get(PRIMARY_KEY_FIELD))
        .filter_map(|v| v.as_str())
        .filter_map(parse_record_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{new_record_id, FieldDescriptor, ObjectTypeDescriptor};
    use tessera_storage::{InMemoryRecordStore, Predicate};

    fn store_with(ids: &[RecordId]) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store
            .create_table_for(
                &ObjectTypeDescriptor::new("company", "companies")
                    .with_field(FieldDescriptor::number("employees")),
            )
            .unwrap();
        for id in ids {
            store
                .insert_row(
                    "company",
                    [("id".to_string(), json!(id.to_string()))].into_iter().collect(),
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_returns_rows_even_when_ids_differ() {
        let ids = [new_record_id(), new_record_id()];
        let store = store_with(&ids);
        let mut query = QueryState::new("company");
        query.and_where(Predicate::eq("id", json!(ids[0].to_string())));
        let payload: StorageUpdatePayload =
            [("employees".to_string(), json!(3))].into_iter().collect();

        // Snapshot claimed both rows; only one matches now.
        let expected: BTreeSet<RecordId> = ids.iter().copied().collect();
        let rows = execute_update(&store, &query, &payload, &expected).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["employees"], json!(3));
    }

    #[tokio::test]
    async fn test_store_failure_is_mutation_failure() {
        let store = store_with(&[new_record_id()]);
        let payload: StorageUpdatePayload =
            [("employees".to_string(), json!("many"))].into_iter().collect();
        let err = execute_update(&store, &QueryState::new("company"), &payload, &BTreeSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MutationExecutionFailed);
    }
}
