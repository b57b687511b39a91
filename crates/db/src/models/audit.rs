//! Audit log entry model.

use serde::{Deserialize, Serialize};
use idyll_core::access::Assignable;
use idyll_core::audit::{AuditAction, ObjectType};
use idyll_core::types::{EntityId, Timestamp};

/// A row from the `audit_logs` table. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: EntityId,
    pub user_id: EntityId,
    pub username: String,
    pub action: String,
    pub object_type: String,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
    pub timestamp: Timestamp,
}

impl AuditLog {
    pub fn action(&self) -> Option<AuditAction> {
        AuditAction::parse(&self.action)
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::parse(&self.object_type)
    }
}

impl Assignable for AuditLog {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAuditLog {
    pub user_id: EntityId,
    pub username: String,
    pub action: AuditAction,
    pub object_type: ObjectType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}
