//! Task record model and DTOs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use idyll_core::access::{Assignable, FieldScope};
use idyll_core::types::{EntityId, Timestamp};

use super::{null_as_default, FieldUpdate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "Can't Do")]
    CantDo,
    #[serde(rename = "Editing")]
    Editing,
    #[serde(rename = "Done")]
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::NotStarted,
        TaskStatus::CantDo,
        TaskStatus::Editing,
        TaskStatus::Done,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::CantDo => "Can't Do",
            TaskStatus::Editing => "Editing",
            TaskStatus::Done => "Done",
        }
    }
}

/// A row from the `task_records` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: EntityId,
    pub table_id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_number: String,
    pub task_name: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub raw_file_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edited_file_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub approval_from_idyll: bool,
    pub assigned_to: EntityId,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub created_by: Option<EntityId>,
}

impl Assignable for TaskRecord {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.assigned_to == user_id
    }
}

/// DTO for adding a task to a task table. `created_by` is set by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskRecord {
    pub table_id: EntityId,
    pub task_number: String,
    pub task_name: String,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub raw_file_link: String,
    #[serde(default)]
    pub edited_file_link: String,
    #[serde(default)]
    pub approval_from_idyll: bool,
    pub assigned_to: EntityId,
}

/// Updatable task columns. The assignee may change the status and the two
/// file links; everything else belongs to managers.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRecordField {
    TaskNumber(String),
    TaskName(String),
    Deadline(Option<NaiveDate>),
    Status(TaskStatus),
    RawFileLink(String),
    EditedFileLink(String),
    ApprovalFromIdyll(bool),
    AssignedTo(EntityId),
}

impl FieldUpdate for TaskRecordField {
    fn column(&self) -> &'static str {
        match self {
            TaskRecordField::TaskNumber(_) => "task_number",
            TaskRecordField::TaskName(_) => "task_name",
            TaskRecordField::Deadline(_) => "deadline",
            TaskRecordField::Status(_) => "status",
            TaskRecordField::RawFileLink(_) => "raw_file_link",
            TaskRecordField::EditedFileLink(_) => "edited_file_link",
            TaskRecordField::ApprovalFromIdyll(_) => "approval_from_idyll",
            TaskRecordField::AssignedTo(_) => "assigned_to",
        }
    }

    fn value(&self) -> Value {
        match self {
            TaskRecordField::TaskNumber(v)
            | TaskRecordField::TaskName(v)
            | TaskRecordField::RawFileLink(v)
            | TaskRecordField::EditedFileLink(v) => json!(v),
            TaskRecordField::Deadline(v) => json!(v),
            TaskRecordField::Status(v) => json!(v.as_str()),
            TaskRecordField::ApprovalFromIdyll(v) => json!(v),
            TaskRecordField::AssignedTo(v) => json!(v),
        }
    }

    fn scope(&self) -> FieldScope {
        match self {
            TaskRecordField::Status(_)
            | TaskRecordField::RawFileLink(_)
            | TaskRecordField::EditedFileLink(_) => FieldScope::Shared,
            _ => FieldScope::ManagerOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_uses_display_strings_on_the_wire() {
        assert_eq!(serde_json::to_value(TaskStatus::CantDo).unwrap(), "Can't Do");
        let parsed: TaskStatus = serde_json::from_value(json!("Not Started")).unwrap();
        assert_eq!(parsed, TaskStatus::NotStarted);
        for status in TaskStatus::ALL {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
    }

    #[test]
    fn row_decodes_with_nullable_links() {
        let row = json!({
            "id": Uuid::new_v4(),
            "table_id": Uuid::new_v4(),
            "task_number": "T-1",
            "task_name": "Colour grade",
            "deadline": "2026-05-01",
            "status": "Editing",
            "raw_file_link": null,
            "edited_file_link": null,
            "approval_from_idyll": null,
            "assigned_to": Uuid::new_v4(),
            "created_at": "2026-04-01T10:00:00Z",
        });
        let task: TaskRecord = serde_json::from_value(row).unwrap();
        assert_eq!(task.status, TaskStatus::Editing);
        assert_eq!(task.raw_file_link, "");
        assert!(!task.approval_from_idyll);
        assert_eq!(task.deadline, NaiveDate::from_ymd_opt(2026, 5, 1));
    }

    #[test]
    fn only_status_and_links_are_shared() {
        let shared: Vec<_> = [
            TaskRecordField::Status(TaskStatus::Done),
            TaskRecordField::RawFileLink("r".into()),
            TaskRecordField::EditedFileLink("e".into()),
        ]
        .iter()
        .map(FieldUpdate::scope)
        .collect();
        assert!(shared.iter().all(|s| *s == FieldScope::Shared));

        for field in [
            TaskRecordField::TaskName("x".into()),
            TaskRecordField::Deadline(None),
            TaskRecordField::ApprovalFromIdyll(true),
            TaskRecordField::AssignedTo(Uuid::new_v4()),
        ] {
            assert_eq!(field.scope(), FieldScope::ManagerOnly, "{field:?}");
        }
    }
}
