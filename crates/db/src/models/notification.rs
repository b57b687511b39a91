//! Notification model and DTOs.

use serde::{Deserialize, Serialize};
use idyll_core::access::Assignable;
use idyll_core::notifications::{NotificationCategory, NotificationText};
use idyll_core::types::{EntityId, Timestamp};

use super::null_as_default;

/// A row from the `notifications` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EntityId,
    pub user_id: EntityId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: NotificationCategory,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read: bool,
    pub created_at: Timestamp,
}

impl Assignable for Notification {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub user_id: EntityId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: NotificationCategory,
    pub read: bool,
}

impl NewNotification {
    pub fn new(user_id: EntityId, text: NotificationText) -> Self {
        Self {
            user_id,
            title: text.title,
            message: text.message,
            category: text.category,
            read: false,
        }
    }
}
