//! Best-effort publishing of view updates to department channels

use async_trait::async_trait;
use batchtrack_types::{BroadcastEventName, Department, WorkItemView};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::Result;

/// One published view update
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEvent {
    pub name: BroadcastEventName,
    pub payload: WorkItemView,
}

impl BroadcastEvent {
    pub fn created(payload: WorkItemView) -> Self {
        Self {
            name: BroadcastEventName::BatchCreated,
            payload,
        }
    }

    pub fn updated(payload: WorkItemView) -> Self {
        Self {
            name: BroadcastEventName::BatchUpdated,
            payload,
        }
    }
}

/// Notification transport to subscribers of department channels.
///
/// Delivery is at-most-once and best-effort; publishing happens only
/// after the state transition committed, and a failure here must never
/// fail the operation that produced the event.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, channel: Department, event: BroadcastEvent) -> Result<()>;
}

/// In-process fan-out over one tokio broadcast channel per department
pub struct ChannelBroadcaster {
    channels: HashMap<Department, broadcast::Sender<BroadcastEvent>>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let mut channels = HashMap::new();
        for department in Department::ALL {
            let (sender, _) = broadcast::channel(capacity);
            channels.insert(department, sender);
        }
        Self { channels }
    }

    pub fn subscribe(&self, department: Department) -> broadcast::Receiver<BroadcastEvent> {
        self.channels[&department].subscribe()
    }

    pub fn stream(&self, department: Department) -> BroadcastStream<BroadcastEvent> {
        BroadcastStream::new(self.subscribe(department))
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, channel: Department, event: BroadcastEvent) -> Result<()> {
        // A send error only means nobody is subscribed right now
        if self.channels[&channel].send(event).is_err() {
            log::debug!("No subscribers on {} channel", channel);
        }
        Ok(())
    }
}

/// Broadcaster that drops every event, for one-shot tools
pub struct NullBroadcaster;

#[async_trait]
impl Broadcaster for NullBroadcaster {
    async fn publish(&self, _channel: Department, _event: BroadcastEvent) -> Result<()> {
        Ok(())
    }
}
