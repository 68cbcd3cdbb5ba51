//! Existence snapshot: the "before" half of a batch update.

use crate::error::{RunnerError, RunnerResult};
use crate::filter_translator::apply_filter;
use crate::formatter::format_output;
use tessera_core::{FilterExpr, ObjectTypeDescriptor, Record};
use tessera_storage::{QueryState, RecordStore};
use tracing::debug;

/// Read the records the filter currently matches.
///
/// Works on a clone of `base`, so the caller's query state stays free of
/// conditions for the update that follows. Fails `RecordNotFound` when
/// nothing matches.
pub async fn capture_existing(
    store: &dyn RecordStore,
    base: &QueryState,
    filter: &FilterExpr,
    descriptor: &ObjectTypeDescriptor,
) -> RunnerResult<Vec<Record>> {
    let mut query = base.clone();
    apply_filter(&mut query, filter, descriptor)?;

    let rows = store.find_many(&query).await?;
    if rows.is_empty() {
        return Err(RunnerError::record_not_found(&descriptor.name_singular));
    }

    debug!(
        object_type = %descriptor.name_singular,
        records = rows.len(),
        "Captured existing records"
    );
    Ok(format_output(&rows, descriptor))
}
