//! Destination resolution for move requests
//!
//! Filing never maps to a department of its own: an item sent to filing
//! stays physically in reception with filing status, so reception staff
//! can keep finished items apart from unmoved drafts.

use batchtrack_types::{Department, Destination, WorkItemStatus};

/// Resolve a requested destination to the physical department and the
/// status the item takes on arrival
pub fn resolve_destination(requested: Destination) -> (Department, WorkItemStatus) {
    match requested {
        Destination::Filing => (Department::Reception, WorkItemStatus::Filing),
        Destination::Reception => (Department::Reception, WorkItemStatus::Inbox),
        Destination::Admittance => (Department::Admittance, WorkItemStatus::Inbox),
        Destination::Billing => (Department::Billing, WorkItemStatus::Inbox),
    }
}
