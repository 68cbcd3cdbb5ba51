//! Tessera Runner - Batch Update Pipeline
//!
//! Applies one partial update to every record of a runtime-described object
//! type that matches a caller filter, then reports what changed.
//!
//! # Architecture
//!
//! ```text
//! UpdateManyArgs
//!   -> validation          (no storage access)
//!   -> filter_translator   (FilterExpr -> Predicate on a QueryState)
//!   -> snapshot            (read on a cloned QueryState, "before")
//!   -> executor            (one UPDATE ... RETURNING, "after")
//!   -> formatter           (storage rows -> canonical records)
//!   -> ChangeEventBus      (before/after snapshots)
//!   -> RelationHydrator    (only when relations were selected)
//!   -> connection          (one single-item connection per record)
//! ```
//!
//! Collaborators are injected as trait objects: `SchemaRegistry` and
//! `RecordStore` from the lower crates, `ChangeEventBus` from
//! `tessera-events`, and `RelationHydrator` defined here.

pub mod auth;
pub mod coerce;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod filter_translator;
pub mod formatter;
pub mod hydrator;
pub mod runner;
pub mod snapshot;
pub mod telemetry;
pub mod validation;

pub use auth::{AuthContext, AuthMethod};
pub use config::RunnerConfig;
pub use connection::{decode_cursor, encode_cursor, PageInfo, RecordConnection, RecordEdge};
pub use error::{ErrorCategory, ErrorCode, RunnerError, RunnerResult};
pub use formatter::{format_input, format_output, UpdatePayload};
pub use hydrator::{HydrationRequest, RelationHydrator, RelationSelection, StoreRelationHydrator};
pub use runner::{SelectedFields, UpdateManyArgs, UpdateManyRunner, UpdateManyStage};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
