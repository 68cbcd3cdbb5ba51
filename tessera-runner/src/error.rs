//! Error Types for the Update Pipeline
//!
//! Every failure the runner reports is a `RunnerError`: a stable `ErrorCode`,
//! a human-readable message and optional structured details. Core errors
//! from `tessera-core` convert into it with `?`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{FilterError, SchemaError, StorageError, TesseraError, ValidationError};
use tessera_events::EventBusError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Stable error codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation (no query executed)
    // ========================================================================
    /// No filter was supplied
    MissingFilter,

    /// Filter is malformed, too deep, or names an unknown field
    InvalidFilter,

    /// An identifier in the filter is not a canonical UUID
    InvalidIdentifier,

    /// The object type cannot be mutated
    MutationNotAllowed,

    /// The update payload is unusable
    InvalidInput,

    /// Operator is unknown or does not apply to the field kind
    UnsupportedFilterOperator,

    // ========================================================================
    // Not found
    // ========================================================================
    /// The object type is not registered
    ObjectTypeNotFound,

    /// The filter matched no records
    RecordNotFound,

    // ========================================================================
    // Storage
    // ========================================================================
    /// The update statement failed
    MutationExecutionFailed,

    // ========================================================================
    // Collaborators (the mutation may have committed)
    // ========================================================================
    /// Relation hydration failed
    HydrationFailed,

    /// Caller may not read a requested relation
    Forbidden,

    /// The change event could not be published
    EventEmissionFailed,

    // ========================================================================
    // Internal
    // ========================================================================
    InternalError,
}

/// Coarse grouping of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Forbidden,
    Storage,
    Collaborator,
    Internal,
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::MissingFilter
            | ErrorCode::InvalidFilter
            | ErrorCode::InvalidIdentifier
            | ErrorCode::MutationNotAllowed
            | ErrorCode::InvalidInput
            | ErrorCode::UnsupportedFilterOperator => ErrorCategory::Validation,

            ErrorCode::ObjectTypeNotFound | ErrorCode::RecordNotFound => ErrorCategory::NotFound,

            ErrorCode::Forbidden => ErrorCategory::Forbidden,

            ErrorCode::MutationExecutionFailed => ErrorCategory::Storage,

            ErrorCode::HydrationFailed | ErrorCode::EventEmissionFailed => {
                ErrorCategory::Collaborator
            }

            ErrorCode::InternalError => ErrorCategory::Internal,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingFilter => "Filter is required",
            ErrorCode::InvalidFilter => "Invalid filter",
            ErrorCode::InvalidIdentifier => "Invalid identifier",
            ErrorCode::MutationNotAllowed => "Object type does not support mutations",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::UnsupportedFilterOperator => "Unsupported filter operator",
            ErrorCode::ObjectTypeNotFound => "Object type not found",
            ErrorCode::RecordNotFound => "No records found to update",
            ErrorCode::MutationExecutionFailed => "Update failed",
            ErrorCode::HydrationFailed => "Failed to load related records",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::EventEmissionFailed => "Failed to publish change event",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// RUNNER ERROR STRUCT
// ============================================================================

/// Structured error returned by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RunnerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error with the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn missing_filter() -> Self {
        Self::from_code(ErrorCode::MissingFilter)
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFilter, message)
    }

    pub fn invalid_identifier(value: &str) -> Self {
        Self::new(
            ErrorCode::InvalidIdentifier,
            format!("'{}' is not a valid identifier", value),
        )
    }

    pub fn mutation_not_allowed(object_type: &str) -> Self {
        Self::new(
            ErrorCode::MutationNotAllowed,
            format!("Object type {} does not support mutations", object_type),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unsupported_operator(field: &str, operator: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedFilterOperator,
            format!("Operator '{}' is not supported on field '{}'", operator, field),
        )
    }

    pub fn object_type_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::ObjectTypeNotFound,
            format!("Object type {} not found", name),
        )
    }

    pub fn record_not_found(object_type: &str) -> Self {
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} records match the filter", object_type),
        )
    }

    pub fn mutation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MutationExecutionFailed, message)
    }

    pub fn hydration_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HydrationFailed, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn event_emission_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EventEmissionFailed, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RunnerError {}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for RunnerError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::MissingFilter => RunnerError::missing_filter(),
            ValidationError::InvalidFilter { .. } => RunnerError::invalid_filter(message),
            ValidationError::InvalidIdentifier { value } => RunnerError::invalid_identifier(&value),
            ValidationError::MutationNotAllowed { object_type } => {
                RunnerError::mutation_not_allowed(&object_type)
            }
            ValidationError::InvalidValue { .. } => RunnerError::invalid_input(message),
        }
    }
}

impl From<FilterError> for RunnerError {
    fn from(err: FilterError) -> Self {
        match &err {
            FilterError::UnsupportedOperator { field, operator } => {
                RunnerError::unsupported_operator(field, operator)
            }
            FilterError::UnknownField { .. }
            | FilterError::Malformed { .. }
            | FilterError::TooDeep { .. } => RunnerError::invalid_filter(err.to_string()),
        }
    }
}

impl From<SchemaError> for RunnerError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::ObjectTypeNotFound { name } => RunnerError::object_type_not_found(&name),
            other => RunnerError::internal_error(other.to_string()),
        }
    }
}

/// Storage failures outside the write path are internal; the executor maps
/// its own failures to `MutationExecutionFailed`.
impl From<StorageError> for RunnerError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Storage error");
        RunnerError::internal_error("Storage operation failed")
            .with_details(serde_json::json!({ "reason": err.to_string() }))
    }
}

impl From<TesseraError> for RunnerError {
    fn from(err: TesseraError) -> Self {
        match err {
            TesseraError::Storage(e) => e.into(),
            TesseraError::Validation(e) => e.into(),
            TesseraError::Filter(e) => e.into(),
            TesseraError::Schema(e) => e.into(),
        }
    }
}

impl From<EventBusError> for RunnerError {
    fn from(err: EventBusError) -> Self {
        tracing::error!(error = %err, "Change event publish failed");
        RunnerError::event_emission_failed(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        RunnerError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias for pipeline operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
