//! Append-only audit logging engine
//!
//! Log events are a post-commit side effect: a sink failure is reported
//! to operational diagnostics and never propagates to the operation
//! that triggered it.

pub mod diff;

use async_trait::async_trait;
use batchtrack_types::{BatchType, Department, EntityId, EntityType, EventType, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::types::WorkItem;
use diff::ChangeMap;

/// One immutable audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event_type: EventType,
    pub department: Department,
    pub batch_type: BatchType,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub batch_id: EntityId,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub changes: ChangeMap,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl LogEvent {
    /// Event for a work item at a department, with empty changes and
    /// metadata
    pub fn for_item(
        event_type: EventType,
        department: Department,
        item: &WorkItem,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            event_type,
            department,
            batch_type: item.batch_type(),
            entity_type: item.entity_type,
            entity_id: item.entity_id.clone(),
            batch_id: item.batch_id.clone(),
            user_id,
            changes: ChangeMap::new(),
            metadata: empty_object(),
            created_at: Utc::now(),
        }
    }

    pub fn with_changes(mut self, changes: ChangeMap) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        self.with_metadata("message", serde_json::Value::String(message.into()))
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.metadata {
            map.insert(key.to_string(), value);
        }
        self
    }
}

/// Append-only persistence for audit log events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_event(&self, event: &LogEvent) -> Result<()>;

    /// All retained events in append order
    async fn read_events(&self) -> Result<Vec<LogEvent>>;
}

/// Audit log engine wrapping a sink. Appends are soft failures.
pub struct AuditTrail<A: AuditSink> {
    sink: Arc<A>,
}

impl<A: AuditSink> AuditTrail<A> {
    pub fn new(sink: Arc<A>) -> Self {
        Self { sink }
    }

    /// Append one event. A sink failure is logged and swallowed - the
    /// state transition that produced the event has already committed.
    pub async fn record(&self, event: LogEvent) {
        match self.sink.append_event(&event).await {
            Ok(()) => {
                log::debug!(
                    "Logged {} for {}:{} at {}",
                    event.event_type,
                    event.entity_type,
                    event.entity_id,
                    event.department
                );
            }
            Err(e) => {
                log::error!(
                    "Failed to append {} audit event for {}:{}: {}",
                    event.event_type,
                    event.entity_type,
                    event.entity_id,
                    e
                );
            }
        }
    }
}
