//! Tessera Storage - Query State, Store Trait and In-Memory Store
//!
//! Everything below the object-type layer: predicates over storage columns,
//! the query builder state shared by reads and writes, the async
//! `RecordStore` trait and an in-memory implementation for tests and
//! embedding.

pub mod memory;
pub mod predicate;
pub mod query;
pub mod store;

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub use memory::{ColumnDef, ColumnType, InMemoryRecordStore, TableSchema};
pub use predicate::{CompareOp, Predicate};
pub use query::{QueryState, StorageUpdatePayload};
pub use store::RecordStore;

/// One row as the store returns it: storage column name to value.
pub type StorageRow = BTreeMap<String, JsonValue>;
