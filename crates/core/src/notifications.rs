//! Notification categories and the message text written for each.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Task,
    Meeting,
    Payout,
}

impl NotificationCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::Task => "task",
            NotificationCategory::Meeting => "meeting",
            NotificationCategory::Payout => "payout",
        }
    }
}

/// Title and body of a notification row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
}

pub fn task_assigned(task_name: &str) -> NotificationText {
    NotificationText {
        category: NotificationCategory::Task,
        title: "New Task Assigned".to_string(),
        message: format!("You have been assigned a new task: {task_name}"),
    }
}

pub fn payout_added(project_name: &str) -> NotificationText {
    NotificationText {
        category: NotificationCategory::Payout,
        title: "New Payout Added".to_string(),
        message: format!("A new payout has been added for project: {project_name}"),
    }
}

pub fn meeting_invited(name: &str, date: &str, time: &str) -> NotificationText {
    NotificationText {
        category: NotificationCategory::Meeting,
        title: "New Meeting Scheduled".to_string(),
        message: format!("You have been invited to: {name} on {date} at {time}"),
    }
}
