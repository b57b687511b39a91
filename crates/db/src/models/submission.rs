//! Public application submissions.

use serde::{Deserialize, Serialize};
use validator::Validate;
use idyll_core::types::{EntityId, Timestamp};

use super::null_as_default;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Reviewed,
    Contacted,
    Rejected,
}

impl SubmissionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Reviewed => "REVIEWED",
            SubmissionStatus::Contacted => "CONTACTED",
            SubmissionStatus::Rejected => "REJECTED",
        }
    }
}

/// A row from the `user_submissions` table. Visible to managers only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubmission {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: SubmissionStatus,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// An application sent from the public `apply` view.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSubmission {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default)]
    pub message: String,
}
