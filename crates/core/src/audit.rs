//! Audit log vocabulary.
//!
//! Action verbs and object types are stored as upper-case strings in the
//! `audit_logs` table. Entries written by older clients may carry verbs not
//! listed here, so rows keep the raw string and parse on demand.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of audit entries fetched per refresh.
pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Clear,
    Login,
    Logout,
}

impl AuditAction {
    pub const ALL: [AuditAction; 6] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::Clear,
        AuditAction::Login,
        AuditAction::Logout,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Clear => "CLEAR",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Object types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    User,
    TaskTable,
    TaskRecord,
    PayoutTable,
    PayoutRecord,
    Meeting,
    AuditLog,
    UserSubmission,
}

impl ObjectType {
    pub const ALL: [ObjectType; 8] = [
        ObjectType::User,
        ObjectType::TaskTable,
        ObjectType::TaskRecord,
        ObjectType::PayoutTable,
        ObjectType::PayoutRecord,
        ObjectType::Meeting,
        ObjectType::AuditLog,
        ObjectType::UserSubmission,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectType::User => "USER",
            ObjectType::TaskTable => "TASK_TABLE",
            ObjectType::TaskRecord => "TASK_RECORD",
            ObjectType::PayoutTable => "PAYOUT_TABLE",
            ObjectType::PayoutRecord => "PAYOUT_RECORD",
            ObjectType::Meeting => "MEETING",
            ObjectType::AuditLog => "AUDIT_LOG",
            ObjectType::UserSubmission => "USER_SUBMISSION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|object| object.as_str() == s)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Serialize a value snapshot for the `old_value` / `new_value` columns.
///
/// Bare strings are stored unquoted so that names read naturally in the log.
pub fn snapshot(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verbs_parse_from_their_wire_form() {
        for action in AuditAction::ALL {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("login"), None);
    }

    #[test]
    fn object_types_match_serde_form() {
        for object in ObjectType::ALL {
            assert_eq!(serde_json::to_value(object).unwrap(), object.as_str());
        }
    }

    #[test]
    fn snapshot_keeps_plain_strings_unquoted() {
        assert_eq!(snapshot(&json!("Episode 4")), "Episode 4");
        assert_eq!(snapshot(&json!({"status": "Done"})), r#"{"status":"Done"}"#);
    }
}
