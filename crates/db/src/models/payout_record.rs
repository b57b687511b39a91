//! Payout record model and DTOs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use idyll_core::access::{Assignable, FieldScope};
use idyll_core::types::{EntityId, Timestamp};

use super::{null_as_default, FieldUpdate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutStatus {
    #[default]
    Pending,
    Done,
}

impl PayoutStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "Pending",
            PayoutStatus::Done => "Done",
        }
    }
}

/// A row from the `payout_records` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub id: EntityId,
    pub table_id: EntityId,
    pub project_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub project_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: PayoutStatus,
    pub assigned_to: EntityId,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub created_by: Option<EntityId>,
}

impl Assignable for PayoutRecord {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.assigned_to == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayoutRecord {
    pub table_id: EntityId,
    pub project_name: String,
    #[serde(default)]
    pub project_link: String,
    pub amount: f64,
    #[serde(default)]
    pub status: PayoutStatus,
    pub assigned_to: EntityId,
}

/// Updatable payout columns. Assignees have a read-only view of payouts.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutRecordField {
    ProjectName(String),
    ProjectLink(String),
    Amount(f64),
    Status(PayoutStatus),
    AssignedTo(EntityId),
}

impl FieldUpdate for PayoutRecordField {
    fn column(&self) -> &'static str {
        match self {
            PayoutRecordField::ProjectName(_) => "project_name",
            PayoutRecordField::ProjectLink(_) => "project_link",
            PayoutRecordField::Amount(_) => "amount",
            PayoutRecordField::Status(_) => "status",
            PayoutRecordField::AssignedTo(_) => "assigned_to",
        }
    }

    fn value(&self) -> Value {
        match self {
            PayoutRecordField::ProjectName(v) | PayoutRecordField::ProjectLink(v) => json!(v),
            PayoutRecordField::Amount(v) => json!(v),
            PayoutRecordField::Status(v) => json!(v.as_str()),
            PayoutRecordField::AssignedTo(v) => json!(v),
        }
    }

    fn scope(&self) -> FieldScope {
        FieldScope::ManagerOnly
    }
}
