//! Async record store trait.

use crate::{QueryState, StorageRow, StorageUpdatePayload};
use async_trait::async_trait;
use tessera_core::TesseraResult;

/// Row-level access to object-type tables.
///
/// Both methods take a fully built `QueryState`; the store never interprets
/// filters itself. Implementations must apply `update_returning` as a single
/// statement: either every matching row is updated or none is.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read every row matching the query, in storage order.
    async fn find_many(&self, query: &QueryState) -> TesseraResult<Vec<StorageRow>>;

    /// Apply `payload` to every row matching the query and return the
    /// post-update row images, in storage order.
    async fn update_returning(
        &self,
        query: &QueryState,
        payload: &StorageUpdatePayload,
    ) -> TesseraResult<Vec<StorageRow>>;
}
