//! Tessera Core - Record Store Types
//!
//! Data types shared by every Tessera crate: identifiers, filter trees,
//! canonical records and snapshots, runtime object-type descriptors and the
//! schema registry contract. No storage or I/O lives here.

pub mod error;
pub mod filter;
pub mod identity;
pub mod record;
pub mod schema;

pub use error::{
    FilterError, SchemaError, StorageError, TesseraError, TesseraResult, ValidationError,
};
pub use filter::{FilterCondition, FilterExpr, FilterOperator};
pub use identity::{
    is_valid_record_id, new_record_id, parse_record_id, RecordId, Timestamp, PRIMARY_KEY_FIELD,
};
pub use record::{Record, RecordSnapshot};
pub use schema::{
    composite_column, FieldDescriptor, FieldKind, InMemorySchemaRegistry, ObjectTypeDescriptor,
    RelationKind, SchemaRegistry,
};
