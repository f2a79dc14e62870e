//! Storage records and request payloads for the workflow core

use batchtrack_types::{
    BatchType, Department, EntityId, EntityType, ItemKey, TransferId, UserId, WorkItemStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::diff::Snapshot;
use crate::error::{Result, TrackError};

/// Editable paperwork attributes carried by a batch and mirrored onto
/// its foreign/urgent sub-cases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchAttributes {
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A trackable unit of paperwork - a batch or a foreign/urgent sub-case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Parent batch id; for a batch this is its own id
    pub batch_id: EntityId,
    pub batch_size: u32,
    pub total_foreign_urgent: u32,
    pub is_pure_foreign_urgent: bool,
    pub attributes: BatchAttributes,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub admitted_by: Option<UserId>,
    pub admitted_at: Option<DateTime<Utc>>,
    pub billed_by: Option<UserId>,
    pub billed_at: Option<DateTime<Utc>>,
    pub filed_by: Option<UserId>,
    pub filed_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl WorkItem {
    /// Create the parent batch record
    pub fn new_batch(
        batch_size: u32,
        total_foreign_urgent: u32,
        attributes: BatchAttributes,
        created_by: Option<UserId>,
    ) -> Self {
        let entity_id = EntityId::new();
        Self {
            entity_type: EntityType::Batch,
            entity_id: entity_id.clone(),
            batch_id: entity_id,
            batch_size,
            total_foreign_urgent,
            is_pure_foreign_urgent: batch_size == total_foreign_urgent,
            attributes,
            created_by,
            created_at: Utc::now(),
            admitted_by: None,
            admitted_at: None,
            billed_by: None,
            billed_at: None,
            filed_by: None,
            filed_at: None,
            archived: false,
        }
    }

    /// Create a foreign/urgent sub-case attached to a parent batch.
    /// It has its own workflow lifecycle; batch counts stay on the parent.
    pub fn new_foreign_urgent(
        batch_id: EntityId,
        attributes: BatchAttributes,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            entity_type: EntityType::ForeignUrgent,
            entity_id: EntityId::new(),
            batch_id,
            batch_size: 0,
            total_foreign_urgent: 0,
            is_pure_foreign_urgent: false,
            attributes,
            created_by,
            created_at: Utc::now(),
            admitted_by: None,
            admitted_at: None,
            billed_by: None,
            billed_at: None,
            filed_by: None,
            filed_at: None,
            archived: false,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.entity_type, self.entity_id.clone())
    }

    pub fn batch_type(&self) -> BatchType {
        match self.entity_type {
            EntityType::Batch => BatchType::Normal,
            EntityType::ForeignUrgent => BatchType::ForeignUrgent,
        }
    }

    pub fn recompute_pure_foreign_urgent(&mut self) {
        self.is_pure_foreign_urgent = self.batch_size == self.total_foreign_urgent;
    }

    /// Field snapshot over the fixed set the audit diff runs on
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();

        let mut batch = std::collections::BTreeMap::new();
        batch.insert("batch_number", json_opt(&self.attributes.batch_number));
        batch.insert("batch_size", serde_json::json!(self.batch_size));
        batch.insert(
            "total_foreign_urgent",
            serde_json::json!(self.total_foreign_urgent),
        );
        snapshot.insert("batch", batch);

        let mut details = std::collections::BTreeMap::new();
        details.insert("scheme_name", json_opt(&self.attributes.scheme_name));
        details.insert("account_number", json_opt(&self.attributes.account_number));
        details.insert("service_date", json_opt(&self.attributes.service_date));
        details.insert("notes", json_opt(&self.attributes.notes));
        snapshot.insert("details", details);

        snapshot
    }
}

fn json_opt(value: &Option<String>) -> serde_json::Value {
    match value {
        Some(s) => serde_json::Value::String(s.clone()),
        None => serde_json::Value::Null,
    }
}

/// Current department and status of an active work item.
/// Exists iff the item has not been archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub department: Department,
    pub status: WorkItemStatus,
    pub created_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn reception_draft(created_by: Option<UserId>) -> Self {
        Self {
            department: Department::Reception,
            status: WorkItemStatus::Current,
            created_by,
            updated_at: Utc::now(),
        }
    }
}

/// Marker that a work item was sent from a department but not yet
/// accepted elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbox {
    pub department: Department,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// One row of the transfer ledger. Pending until accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: TransferId,
    pub from_department: Department,
    pub to_department: Department,
    pub target_status: WorkItemStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub accepted_by: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn pending(
        from_department: Department,
        to_department: Department,
        target_status: WorkItemStatus,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            transfer_id: TransferId::new(),
            from_department,
            to_department,
            target_status,
            created_by,
            created_at: Utc::now(),
            accepted_by: None,
            accepted_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.accepted_at.is_none()
    }
}

/// Payload for creating a batch plus its attached foreign/urgent cases.
/// Unknown fields are rejected at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBatchRequest {
    pub batch_size: u32,
    pub total_foreign_urgent: u32,
    #[serde(default)]
    pub attributes: BatchAttributes,
    #[serde(default)]
    pub children: Vec<ForeignUrgentChild>,
}

impl CreateBatchRequest {
    pub fn validate(&self) -> Result<()> {
        if self.total_foreign_urgent > self.batch_size {
            return Err(TrackError::Validation(format!(
                "total_foreign_urgent ({}) exceeds batch_size ({})",
                self.total_foreign_urgent, self.batch_size
            )));
        }
        Ok(())
    }
}

/// A foreign/urgent sub-case attached at batch creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignUrgentChild {
    #[serde(default)]
    pub attributes: BatchAttributes,
}

/// Allow-listed field patch for `update_work_item_fields`.
/// `None` leaves the stored value unchanged; unknown fields are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePatch {
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub total_foreign_urgent: Option<u32>,
}

impl UpdatePatch {
    pub fn is_empty(&self) -> bool {
        self.batch_number.is_none()
            && self.scheme_name.is_none()
            && self.account_number.is_none()
            && self.service_date.is_none()
            && self.notes.is_none()
            && self.batch_size.is_none()
            && self.total_foreign_urgent.is_none()
    }

    /// Apply the full patch to a batch, revalidating the foreign/urgent
    /// count against the batch size
    pub fn apply_to_batch(&self, item: &mut WorkItem) -> Result<()> {
        self.apply_attributes(&mut item.attributes);
        if let Some(batch_size) = self.batch_size {
            item.batch_size = batch_size;
        }
        if let Some(total_foreign_urgent) = self.total_foreign_urgent {
            item.total_foreign_urgent = total_foreign_urgent;
        }
        if item.total_foreign_urgent > item.batch_size {
            return Err(TrackError::Validation(format!(
                "total_foreign_urgent ({}) exceeds batch_size ({})",
                item.total_foreign_urgent, item.batch_size
            )));
        }
        item.recompute_pure_foreign_urgent();
        Ok(())
    }

    /// Attribute-only view of the patch, as mirrored onto sub-cases
    pub fn apply_attributes(&self, attributes: &mut BatchAttributes) {
        if let Some(ref batch_number) = self.batch_number {
            attributes.batch_number = Some(batch_number.clone());
        }
        if let Some(ref scheme_name) = self.scheme_name {
            attributes.scheme_name = Some(scheme_name.clone());
        }
        if let Some(ref account_number) = self.account_number {
            attributes.account_number = Some(account_number.clone());
        }
        if let Some(ref service_date) = self.service_date {
            attributes.service_date = Some(service_date.clone());
        }
        if let Some(ref notes) = self.notes {
            attributes.notes = Some(notes.clone());
        }
    }
}
