//! Tessera Events - Change Events and the Event Bus
//!
//! A successful batch update produces one `ChangeEvent` carrying immutable
//! before/after snapshots. The event is handed to a `ChangeEventBus`; what
//! happens next (fan-out, persistence, webhooks) is the bus's business.
//!
//! # Key Types
//!
//! - `ChangeEvent`: the batch-level event
//! - `RecordUpdateEvent`: one record's before/after pair plus its field diff
//! - `ChangeEventBus`: publish boundary
//! - `BroadcastEventBus`: tokio broadcast implementation

mod bus;
mod event;

pub use bus::{BroadcastEventBus, ChangeEventBus, EventBusError};
pub use event::{Actor, ChangeEvent, FieldDiff, RecordUpdateEvent};
