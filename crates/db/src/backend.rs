//! Capability traits for the remote store.
//!
//! The client depends on three capability shapes only:
//!
//! - [`AuthBackend`]: credential exchange, current session, sign-out and a
//!   stream of session changes.
//! - [`TableBackend`]: `select` / `insert` / `update` / `delete` on a named
//!   table with equality, containment and membership filters.
//! - [`ChangeFeed`]: "something changed in this table" notifications.
//!
//! Rows travel as `serde_json::Value`; [`crate::repositories`] decode them
//! into typed models.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use idyll_core::change::ChangeEvent;
use idyll_core::error::{AuthError, CoreError};
use idyll_core::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// The credential record held by the auth capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: EntityId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// The username chosen at sign-up, if one was recorded.
    pub fn metadata_username(&self) -> Option<&str> {
        self.user_metadata
            .get("username")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Timestamp,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: Timestamp, margin: chrono::Duration) -> bool {
        self.expires_at - margin <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session change pushed by the auth capability.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(&'static str, Value),
    /// `column <> value`
    Neq(&'static str, Value),
    /// Array `column` contains every element of the given array.
    Contains(&'static str, Value),
    /// `column` is one of the given values.
    In(&'static str, Vec<Value>),
}

impl Filter {
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(column, _)
            | Filter::Neq(column, _)
            | Filter::Contains(column, _)
            | Filter::In(column, _) => column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn order_by(mut self, column: &'static str, ascending: bool) -> Self {
        self.order = Some(Order { column, ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Wire form of an id inside a filter.
pub fn id_value(id: EntityId) -> Value {
    Value::String(id.to_string())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Remote API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Auth(AuthError),

    #[error("Duplicate value for {table}.{column}")]
    UniqueViolation { table: String, column: String },

    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, BackendError::UniqueViolation { .. })
    }
}

/// Classify a remote failure into the client error taxonomy.
impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Auth(auth) => CoreError::Auth(auth),
            BackendError::UniqueViolation { table, column } => {
                CoreError::Conflict(format!("A row in {table} already uses this {column}"))
            }
            BackendError::Api { status, body } => match status {
                401 | 403 => CoreError::Forbidden(body),
                404 => CoreError::NotFound {
                    entity: "resource",
                    id: body,
                },
                409 => CoreError::Conflict(body),
                400..=499 => CoreError::Validation(body),
                _ => {
                    tracing::error!(status, body = %body, "Remote API error");
                    CoreError::RemoteUnavailable(format!("remote returned {status}"))
                }
            },
            BackendError::Request(e) => {
                tracing::warn!(error = %e, "Remote request failed");
                CoreError::RemoteUnavailable(e.to_string())
            }
            BackendError::Unavailable(reason) => CoreError::RemoteUnavailable(reason),
            BackendError::Decode(e) => {
                tracing::error!(error = %e, "Failed to decode remote row");
                CoreError::Internal(format!("Malformed row: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Register a credential. Does not sign in.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthUser, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The current session, refreshed first if its token has expired.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Exchange a persisted refresh token for a fresh session.
    async fn restore_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    /// Session changes: sign-in, sign-out, token refresh.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert one row, returning it as stored.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    /// Apply `patch` to every row matching `filters`, returning those rows.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    /// Delete every row matching `filters`, returning how many went.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, BackendError>;
}

pub trait ChangeFeed: Send + Sync {
    /// Receive a [`ChangeEvent`] whenever `table` changes. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;
}

/// Everything the client needs from the remote store.
pub trait Backend: AuthBackend + TableBackend + ChangeFeed {}

impl<T: AuthBackend + TableBackend + ChangeFeed> Backend for T {}

pub type SharedBackend = Arc<dyn Backend>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn query_builder_accumulates_filters() {
        let query = Query::new()
            .eq("status", "Done")
            .filter(Filter::Contains("attendees", json!(["a"])))
            .order_by("created_at", false)
            .limit(5);
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].column(), "attendees");
        assert_eq!(
            query.order,
            Some(Order {
                column: "created_at",
                ascending: false
            })
        );
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn unique_violation_classifies_as_conflict() {
        let err = BackendError::UniqueViolation {
            table: "users".into(),
            column: "username".into(),
        };
        assert!(err.is_unique_violation());
        assert_matches!(CoreError::from(err), CoreError::Conflict(_));
    }

    #[test]
    fn permission_denied_classifies_as_forbidden() {
        let err = BackendError::Api {
            status: 403,
            body: "permission denied for table task_records".into(),
        };
        assert_matches!(CoreError::from(err), CoreError::Forbidden(_));
    }

    #[test]
    fn server_errors_classify_as_unavailable() {
        let err = BackendError::Api {
            status: 503,
            body: "upstream down".into(),
        };
        assert_matches!(CoreError::from(err), CoreError::RemoteUnavailable(_));
        assert_matches!(
            CoreError::from(BackendError::Unavailable("offline".into())),
            CoreError::RemoteUnavailable(_)
        );
    }

    #[test]
    fn auth_errors_pass_through() {
        let err = BackendError::Auth(AuthError::WeakPassword("too short".into()));
        assert_matches!(
            CoreError::from(err),
            CoreError::Auth(AuthError::WeakPassword(_))
        );
    }

    #[test]
    fn metadata_username_ignores_blank_values() {
        let user = AuthUser {
            id: EntityId::nil(),
            email: Some("a@b.c".into()),
            user_metadata: json!({"username": "  "}),
        };
        assert_eq!(user.metadata_username(), None);
    }
}
