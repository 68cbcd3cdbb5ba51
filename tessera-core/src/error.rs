//! Error types for Tessera operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Column {column} does not exist on table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Update failed on {table}: {reason}")]
    UpdateFailed { table: String, reason: String },

    #[error("Query failed on {table}: {reason}")]
    QueryFailed { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors raised before any storage access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Filter is required")]
    MissingFilter,

    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("Invalid identifier: {value}")]
    InvalidIdentifier { value: String },

    #[error("Object type {object_type} does not support mutations")]
    MutationNotAllowed { object_type: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Filter parsing and translation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unsupported filter operator {operator} on field {field}")]
    UnsupportedOperator { field: String, operator: String },

    #[error("Unknown field {field} on object type {object_type}")]
    UnknownField { object_type: String, field: String },

    #[error("Malformed filter: {reason}")]
    Malformed { reason: String },

    #[error("Filter depth {depth} exceeds maximum of {max}")]
    TooDeep { depth: usize, max: usize },
}

/// Schema registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Object type not found: {name}")]
    ObjectTypeNotFound { name: String },

    #[error("Object type registered twice: {name}")]
    DuplicateObjectType { name: String },

    #[error("Relation {field} on {object_type} targets unknown object type {target}")]
    UnknownRelationTarget {
        object_type: String,
        field: String,
        target: String,
    },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error)]
pub enum TesseraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================
