//! Identity profile model and DTOs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use idyll_core::access::{Actor, Assignable, FieldScope};
use idyll_core::preferences::Theme;
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_core::types::{EntityId, Timestamp};

use super::{default_true, null_as_default, null_as_true, FieldUpdate};
use crate::backend::AuthUser;

/// Label shown wherever a referenced identity no longer exists.
pub const UNKNOWN_USER_LABEL: &str = "Unknown";

/// A row from the `users` table. The id equals the auth credential id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ApprovalStatus,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub theme: Theme,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub sound_enabled: bool,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role, self.status)
    }

    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            "user"
        } else {
            &self.username
        }
    }
}

impl Assignable for User {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.id == user_id
    }

    fn is_profile_of(&self, user_id: EntityId) -> bool {
        self.id == user_id
    }
}

/// Resolve a user id to a display label, degrading to
/// [`UNKNOWN_USER_LABEL`] for dangling references.
pub fn label_for(users: &[User], id: EntityId) -> &str {
    users
        .iter()
        .find(|user| user.id == id)
        .map(User::display_name)
        .unwrap_or(UNKNOWN_USER_LABEL)
}

/// DTO for creating a profile row.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: EntityId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub status: ApprovalStatus,
    pub theme: Theme,
    pub sound_enabled: bool,
}

impl NewUser {
    /// The default profile for a credential that has none yet.
    pub fn provisional(auth: &AuthUser) -> Self {
        let email = auth.email.clone().unwrap_or_default();
        let username = auth
            .metadata_username()
            .map(str::to_string)
            .or_else(|| email.split('@').next().map(str::to_string))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "user".to_string());
        Self {
            id: auth.id,
            username,
            email,
            role: Role::default(),
            status: ApprovalStatus::default(),
            theme: Theme::default(),
            sound_enabled: true,
        }
    }

    /// An unpersisted profile, used when the remote insert fails.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            role: self.role,
            status: self.status,
            avatar_url: None,
            theme: self.theme,
            sound_enabled: self.sound_enabled,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Updatable profile columns.
#[derive(Debug, Clone, PartialEq)]
pub enum UserField {
    Username(String),
    Email(String),
    AvatarUrl(Option<String>),
    Theme(Theme),
    SoundEnabled(bool),
    Role(Role),
    Status(ApprovalStatus),
}

impl FieldUpdate for UserField {
    fn column(&self) -> &'static str {
        match self {
            UserField::Username(_) => "username",
            UserField::Email(_) => "email",
            UserField::AvatarUrl(_) => "avatar_url",
            UserField::Theme(_) => "theme",
            UserField::SoundEnabled(_) => "sound_enabled",
            UserField::Role(_) => "role",
            UserField::Status(_) => "status",
        }
    }

    fn value(&self) -> Value {
        match self {
            UserField::Username(v) | UserField::Email(v) => json!(v),
            UserField::AvatarUrl(v) => json!(v),
            UserField::Theme(v) => json!(v.as_str()),
            UserField::SoundEnabled(v) => json!(v),
            UserField::Role(v) => json!(v.as_str()),
            UserField::Status(v) => json!(v.as_str()),
        }
    }

    fn scope(&self) -> FieldScope {
        match self {
            UserField::Role(_) | UserField::Status(_) => FieldScope::ManagerOnly,
            _ => FieldScope::Shared,
        }
    }
}
