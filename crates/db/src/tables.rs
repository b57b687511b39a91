//! Remote table names.

pub const USERS: &str = "users";
pub const TASK_TABLES: &str = "task_tables";
pub const TASK_RECORDS: &str = "task_records";
pub const PAYOUT_TABLES: &str = "payout_tables";
pub const PAYOUT_RECORDS: &str = "payout_records";
pub const MEETINGS: &str = "meetings";
pub const AUDIT_LOGS: &str = "audit_logs";
pub const NOTIFICATIONS: &str = "notifications";
pub const USER_SUBMISSIONS: &str = "user_submissions";

/// Every table the client subscribes to.
pub const ALL: [&str; 9] = [
    USERS,
    TASK_TABLES,
    TASK_RECORDS,
    PAYOUT_TABLES,
    PAYOUT_RECORDS,
    MEETINGS,
    AUDIT_LOGS,
    NOTIFICATIONS,
    USER_SUBMISSIONS,
];

/// Tables whose rows carry an `updated_at` column.
pub fn has_updated_at(table: &str) -> bool {
    matches!(
        table,
        USERS | TASK_TABLES | TASK_RECORDS | PAYOUT_TABLES | PAYOUT_RECORDS | MEETINGS | USER_SUBMISSIONS
    )
}
