//! Shared types for the batch tracking system
//! No string-based state management - everything is strongly typed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a closed enumeration from a string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: '{value}'")]
pub struct InvalidValue {
    pub kind: &'static str,
    pub value: String,
}

impl InvalidValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The departments a work item can physically sit in.
///
/// "filing" is deliberately NOT a department - it is a status overlay
/// parked in reception (see [`Destination`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Reception,
    Admittance,
    Billing,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reception => "reception",
            Self::Admittance => "admittance",
            Self::Billing => "billing",
        }
    }

    pub const ALL: [Department; 3] = [Self::Reception, Self::Admittance, Self::Billing];
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Department {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reception" => Ok(Self::Reception),
            "admittance" => Ok(Self::Admittance),
            "billing" => Ok(Self::Billing),
            other => Err(InvalidValue::new("department", other)),
        }
    }
}

/// Workflow status of a work item at its current location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Current,
    Inbox,
    Filing,
    Archived,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Inbox => "inbox",
            Self::Filing => "filing",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "inbox" => Ok(Self::Inbox),
            "filing" => Ok(Self::Filing),
            "archived" => Ok(Self::Archived),
            other => Err(InvalidValue::new("status", other)),
        }
    }
}

/// Kind of trackable work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Batch,
    ForeignUrgent,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::ForeignUrgent => "foreign_urgent",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Self::Batch),
            "foreign_urgent" => Ok(Self::ForeignUrgent),
            other => Err(InvalidValue::new("entity type", other)),
        }
    }
}

/// Batch flavour recorded on audit log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    Normal,
    ForeignUrgent,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ForeignUrgent => "foreign_urgent",
        }
    }
}

/// A destination a work item can be sent to.
///
/// Filing is a pseudo-destination: physically the item stays in
/// reception with filing status, so reception staff can tell finished
/// items apart from unmoved drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Reception,
    Admittance,
    Billing,
    Filing,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reception => "reception",
            Self::Admittance => "admittance",
            Self::Billing => "billing",
            Self::Filing => "filing",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Destination {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reception" => Ok(Self::Reception),
            "admittance" => Ok(Self::Admittance),
            "billing" => Ok(Self::Billing),
            "filing" => Ok(Self::Filing),
            other => Err(InvalidValue::new("destination", other)),
        }
    }
}

/// Status a department can settle an accepted item into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptStatus {
    Current,
    Filing,
}

/// Audit log event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BatchCreated,
    ForeignUrgentCreated,
    BatchSent,
    BatchReceived,
    BatchToFiling,
    BatchAccepted,
    BatchAcceptedDownstream,
    TransferCancelled,
    TransferCancelledRemote,
    BatchArchived,
    BatchUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchCreated => "BATCH_CREATED",
            Self::ForeignUrgentCreated => "FOREIGN_URGENT_CREATED",
            Self::BatchSent => "BATCH_SENT",
            Self::BatchReceived => "BATCH_RECEIVED",
            Self::BatchToFiling => "BATCH_TO_FILING",
            Self::BatchAccepted => "BATCH_ACCEPTED",
            Self::BatchAcceptedDownstream => "BATCH_ACCEPTED_DOWNSTREAM",
            Self::TransferCancelled => "TRANSFER_CANCELLED",
            Self::TransferCancelledRemote => "TRANSFER_CANCELLED_REMOTE",
            Self::BatchArchived => "BATCH_ARCHIVED",
            Self::BatchUpdated => "BATCH_UPDATED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Names of events published to department channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastEventName {
    #[serde(rename = "batchCreated")]
    BatchCreated,
    #[serde(rename = "batchUpdated")]
    BatchUpdated,
}

impl BroadcastEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchCreated => "batchCreated",
            Self::BatchUpdated => "batchUpdated",
        }
    }
}

/// Strongly typed work item id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, InvalidValue> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|_| InvalidValue::new("entity id", s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed transfer ledger row id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acting user id supplied by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key of a work item across both entity types
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl ItemKey {
    pub fn new(entity_type: EntityType, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }

    pub fn batch(entity_id: EntityId) -> Self {
        Self::new(EntityType::Batch, entity_id)
    }

    pub fn foreign_urgent(entity_id: EntityId) -> Self {
        Self::new(EntityType::ForeignUrgent, entity_id)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Snapshot of a work item's position published to departments and
/// returned from workflow operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemView {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub batch_id: EntityId,
    pub current_department: Department,
    pub status: WorkItemStatus,
    pub is_pure_foreign_urgent: bool,
    pub transfer_from_department: Option<Department>,
    pub transfer_to_department: Option<Department>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_round_trips_through_strings() {
        for dept in Department::ALL {
            assert_eq!(dept.as_str().parse::<Department>().unwrap(), dept);
        }
        assert!("filing".parse::<Department>().is_err());
        assert!("".parse::<Department>().is_err());
    }

    #[test]
    fn destination_accepts_filing() {
        assert_eq!("filing".parse::<Destination>().unwrap(), Destination::Filing);
        assert_eq!("billing".parse::<Destination>().unwrap(), Destination::Billing);
        assert!("archive".parse::<Destination>().is_err());
    }

    #[test]
    fn entity_id_requires_uuid_format() {
        let id = EntityId::new();
        assert!(EntityId::from_string(id.as_str()).is_ok());
        assert!(EntityId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn event_type_wire_names() {
        let json = serde_json::to_string(&EventType::BatchAcceptedDownstream).unwrap();
        assert_eq!(json, "\"BATCH_ACCEPTED_DOWNSTREAM\"");
        assert_eq!(EventType::BatchToFiling.as_str(), "BATCH_TO_FILING");
    }

    #[test]
    fn broadcast_event_names_are_camel_case() {
        assert_eq!(BroadcastEventName::BatchCreated.as_str(), "batchCreated");
        let json = serde_json::to_string(&BroadcastEventName::BatchUpdated).unwrap();
        assert_eq!(json, "\"batchUpdated\"");
    }

    #[test]
    fn item_key_display() {
        let id = EntityId::new();
        let key = ItemKey::batch(id.clone());
        assert_eq!(key.to_string(), format!("batch:{}", id));
    }

    #[test]
    fn department_serializes_snake_case() {
        let json = serde_json::to_string(&Department::Admittance).unwrap();
        assert_eq!(json, "\"admittance\"");
        let back: Department = serde_json::from_str("\"billing\"").unwrap();
        assert_eq!(back, Department::Billing);
    }
}
