//! Change event bus.

use crate::ChangeEvent;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors a bus may report on publish.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event {event_name} rejected: {reason}")]
    Rejected { event_name: String, reason: String },
}

/// Publish boundary for change events.
#[async_trait]
pub trait ChangeEventBus: Send + Sync {
    async fn publish(&self, event: ChangeEvent) -> Result<(), EventBusError>;
}

/// Bus backed by a tokio broadcast channel.
///
/// Subscribers receive every event published after they subscribed. A slow
/// subscriber whose buffer fills misses events (lagged); publishing never
/// waits on subscribers.
#[derive(Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<Arc<ChangeEvent>>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for BroadcastEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[async_trait]
impl ChangeEventBus for BroadcastEventBus {
    async fn publish(&self, event: ChangeEvent) -> Result<(), EventBusError> {
        let name = event.name.clone();
        let records = event.records.len();
        match self.tx.send(Arc::new(event)) {
            Ok(receivers) => {
                debug!(event = %name, records, receivers, "Published change event");
            }
            Err(_) => {
                // No subscribers is not a failure.
                warn!(event = %name, records, "No subscribers for change event");
            }
        }
        Ok(())
    }
}
