//! In-process backend.
//!
//! [`MemoryBackend`] keeps every table as a vector of JSON rows and mirrors
//! the remote behavior the client relies on: generated ids and timestamps,
//! unique columns, the sign-up trigger that creates a pending editor
//! profile, hashed passwords, signed session tokens and per-table change
//! events.
//!
//! Several client handles can share one server, each holding its own
//! session. Tests use this to model a manager and an editor working at the
//! same time:
//!
//! ```rust
//! use idyll_db::MemoryBackend;
//!
//! let manager_side = MemoryBackend::new();
//! let editor_side = manager_side.new_client();
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;
use idyll_core::change::{ChangeEvent, ChangeKind};
use idyll_core::error::AuthError;

use crate::backend::{
    AuthBackend, AuthEvent, AuthEventKind, AuthUser, BackendError, ChangeFeed, Filter, Query,
    Session, TableBackend,
};
use crate::models::user::NewUser;
use crate::tables;

/// Same floor the hosted auth service enforces by default.
const MIN_PASSWORD_LENGTH: usize = 6;

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

const CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: i64,
    iat: i64,
    jti: String,
}

struct Account {
    id: Uuid,
    email: String,
    password_hash: String,
    metadata: Value,
    refresh_tokens: Vec<String>,
}

impl Account {
    fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: Some(self.email.clone()),
            user_metadata: self.metadata.clone(),
        }
    }
}

struct Server {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    accounts: RwLock<Vec<Account>>,
    feeds: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    jwt_secret: String,
    hasher: Argon2<'static>,
    token_ttl_secs: AtomicI64,
    available: AtomicBool,
    latency_ms: AtomicU64,
    profile_trigger: AtomicBool,
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn internal(e: impl std::fmt::Display) -> BackendError {
    BackendError::Api {
        status: 500,
        body: e.to_string(),
    }
}

/// Columns that must be unique within a table, besides `id`.
fn unique_columns(table: &str) -> &'static [&'static str] {
    match table {
        tables::USERS => &["username", "email"],
        _ => &[],
    }
}

impl Server {
    fn new() -> Self {
        // Low-cost parameters; this store never holds real credentials.
        let hasher = Params::new(4096, 1, 1, None)
            .map(|params| Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
            .unwrap_or_default();
        Self {
            tables: RwLock::new(HashMap::new()),
            accounts: RwLock::new(Vec::new()),
            feeds: Mutex::new(HashMap::new()),
            jwt_secret: Uuid::new_v4().to_string(),
            hasher,
            token_ttl_secs: AtomicI64::new(DEFAULT_TOKEN_TTL_SECS),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            profile_trigger: AtomicBool::new(true),
        }
    }

    /// Apply the configured latency, then fail if the store is offline.
    async fn gate(&self) -> Result<(), BackendError> {
        let latency = self.latency_ms.load(AtomicOrdering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.available.load(AtomicOrdering::Relaxed) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("memory backend is offline".into()))
        }
    }

    fn feed(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        feeds
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn emit(&self, table: &str, kind: ChangeKind) {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = feeds.get(table) {
            let _ = sender.send(ChangeEvent::new(table, kind));
        }
    }

    // -- tables -------------------------------------------------------------

    async fn select_rows(&self, table: &str, query: &Query) -> Vec<Value> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(order.column), b.get(order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }

    async fn insert_row(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let Value::Object(mut map) = row else {
            return Err(BackendError::Api {
                status: 400,
                body: "row must be a JSON object".into(),
            });
        };
        let now = now_string();
        map.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
        let created_column = if table == tables::AUDIT_LOGS {
            "timestamp"
        } else {
            "created_at"
        };
        map.entry(created_column).or_insert_with(|| json!(now));
        if tables::has_updated_at(table) {
            map.entry("updated_at").or_insert_with(|| json!(now));
        }
        let row = Value::Object(map);

        let mut all = self.tables.write().await;
        let rows = all.entry(table.to_string()).or_default();
        for column in std::iter::once("id").chain(unique_columns(table).iter().copied()) {
            if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
                if rows.iter().any(|existing| existing.get(column) == Some(value)) {
                    return Err(BackendError::UniqueViolation {
                        table: table.to_string(),
                        column: column.to_string(),
                    });
                }
            }
        }
        rows.push(row.clone());
        drop(all);

        self.emit(table, ChangeKind::Insert);
        Ok(row)
    }

    async fn update_rows(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let Value::Object(patch) = patch else {
            return Err(BackendError::Api {
                status: 400,
                body: "patch must be a JSON object".into(),
            });
        };

        let mut all = self.tables.write().await;
        let Some(rows) = all.get_mut(table) else {
            return Ok(Vec::new());
        };

        for column in unique_columns(table) {
            let Some(value) = patch.get(*column) else {
                continue;
            };
            let clash = rows.iter().any(|row| {
                row.get(*column) == Some(value) && !filters.iter().all(|f| matches_filter(row, f))
            });
            if clash {
                return Err(BackendError::UniqueViolation {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }

        let mut updated = Vec::new();
        for row in rows
            .iter_mut()
            .filter(|row| filters.iter().all(|f| matches_filter(row, f)))
        {
            if let Value::Object(map) = row {
                merge(map, &patch);
            }
            updated.push(row.clone());
        }
        drop(all);

        if !updated.is_empty() {
            self.emit(table, ChangeKind::Update);
        }
        Ok(updated)
    }

    async fn delete_rows(&self, table: &str, filters: &[Filter]) -> usize {
        let mut all = self.tables.write().await;
        let Some(rows) = all.get_mut(table) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| matches_filter(row, f)));
        let removed = before - rows.len();
        drop(all);

        if removed > 0 {
            self.emit(table, ChangeKind::Delete);
        }
        removed
    }

    // -- auth ---------------------------------------------------------------

    fn hash_password(&self, password: &str) -> Result<String, BackendError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(internal)?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                self.hasher
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    fn issue_session(&self, account: &mut Account) -> Result<Session, BackendError> {
        let now = Utc::now();
        let ttl = self.token_ttl_secs.load(AtomicOrdering::Relaxed);
        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl,
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(internal)?;
        let refresh_token = Uuid::new_v4().simple().to_string();
        account.refresh_tokens.push(refresh_token.clone());
        Ok(Session {
            access_token,
            refresh_token,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(now),
            user: account.auth_user(),
        })
    }

    /// `true` if the token carries a valid signature and has not expired.
    fn token_is_valid(&self, token: &str) -> bool {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .is_ok()
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.refresh_tokens.iter().any(|t| t == refresh_token))
            .ok_or(BackendError::Auth(AuthError::NotSignedIn))?;
        account.refresh_tokens.retain(|t| t != refresh_token);
        self.issue_session(account)
    }

    async fn revoke_refresh_token(&self, refresh_token: &str) {
        let mut accounts = self.accounts.write().await;
        for account in accounts.iter_mut() {
            account.refresh_tokens.retain(|t| t != refresh_token);
        }
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn merge(row: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (column, value) in patch {
        row.insert(column.clone(), value.clone());
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, value) => row.get(*column) == Some(value),
        Filter::Neq(column, value) => row.get(*column) != Some(value),
        Filter::Contains(column, wanted) => match (row.get(*column), wanted) {
            (Some(Value::Array(have)), Value::Array(wanted)) => {
                wanted.iter().all(|w| have.contains(w))
            }
            _ => false,
        },
        Filter::In(column, values) => row.get(*column).is_some_and(|v| values.contains(v)),
    }
}

/// Order like Postgres: timestamps chronologically, nulls last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let is_null = |v: Option<&Value>| v.map_or(true, Value::is_null);
    match (a, b) {
        _ if is_null(a) && is_null(b) => Ordering::Equal,
        _ if is_null(a) => Ordering::Greater,
        _ if is_null(b) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// A client handle onto an in-process store.
#[derive(Clone)]
pub struct MemoryBackend {
    server: Arc<Server>,
    session: Arc<RwLock<Option<Session>>>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl MemoryBackend {
    /// A fresh, empty store with one client handle.
    pub fn new() -> Self {
        Self::attach(Arc::new(Server::new()))
    }

    /// Another client of the same store, with no session.
    pub fn new_client(&self) -> Self {
        Self::attach(Arc::clone(&self.server))
    }

    fn attach(server: Arc<Server>) -> Self {
        let (auth_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            server,
            session: Arc::new(RwLock::new(None)),
            auth_events,
        }
    }

    /// Take the whole store offline (or back online) for every client.
    pub fn set_available(&self, available: bool) {
        self.server
            .available
            .store(available, AtomicOrdering::Relaxed);
    }

    /// Delay every remote call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.server.latency_ms.store(millis, AtomicOrdering::Relaxed);
    }

    /// Lifetime of newly issued access tokens. Negative values issue
    /// already-expired tokens.
    pub fn set_token_ttl(&self, ttl: chrono::Duration) {
        self.server
            .token_ttl_secs
            .store(ttl.num_seconds(), AtomicOrdering::Relaxed);
    }

    /// Enable or disable profile creation on sign-up.
    pub fn set_profile_trigger(&self, enabled: bool) {
        self.server
            .profile_trigger
            .store(enabled, AtomicOrdering::Relaxed);
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.server
            .tables
            .read()
            .await
            .get(table)
            .map_or(0, Vec::len)
    }

    fn publish(&self, kind: AuthEventKind, session: Option<Session>) {
        let _ = self.auth_events.send(AuthEvent::new(kind, session));
    }

    async fn install(&self, kind: AuthEventKind, session: Session) -> Session {
        *self.session.write().await = Some(session.clone());
        self.publish(kind, Some(session.clone()));
        session
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthUser, BackendError> {
        self.server.gate().await?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(BackendError::Auth(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LENGTH} characters"
            ))));
        }
        let email = email.trim().to_lowercase();
        let password_hash = self.server.hash_password(password)?;

        let auth_user = {
            let mut accounts = self.server.accounts.write().await;
            if accounts.iter().any(|a| a.email == email) {
                return Err(BackendError::Auth(AuthError::DuplicateAccount));
            }
            let account = Account {
                id: Uuid::new_v4(),
                email,
                password_hash,
                metadata,
                refresh_tokens: Vec::new(),
            };
            let auth_user = account.auth_user();
            accounts.push(account);
            auth_user
        };

        if self.server.profile_trigger.load(AtomicOrdering::Relaxed) {
            let profile = serde_json::to_value(NewUser::provisional(&auth_user))?;
            if let Err(e) = self.server.insert_row(tables::USERS, profile).await {
                tracing::warn!(error = %e, "Sign-up profile trigger failed");
                let mut accounts = self.server.accounts.write().await;
                accounts.retain(|a| a.id != auth_user.id);
                return Err(internal("Database error saving new user"));
            }
        }
        Ok(auth_user)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.server.gate().await?;
        let email = email.trim().to_lowercase();
        let session = {
            let mut accounts = self.server.accounts.write().await;
            let account = accounts
                .iter_mut()
                .find(|a| a.email == email)
                .filter(|a| self.server.verify_password(password, &a.password_hash))
                .ok_or(BackendError::Auth(AuthError::InvalidCredentials))?;
            self.server.issue_session(account)?
        };
        Ok(self.install(AuthEventKind::SignedIn, session).await)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();
        if let Some(session) = previous {
            self.server
                .revoke_refresh_token(&session.refresh_token)
                .await;
        }
        self.publish(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.server.gate().await?;
        let current = self.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if self.server.token_is_valid(&session.access_token) {
            return Ok(Some(session));
        }
        match self
            .server
            .exchange_refresh_token(&session.refresh_token)
            .await
        {
            Ok(fresh) => Ok(Some(self.install(AuthEventKind::TokenRefreshed, fresh).await)),
            Err(BackendError::Auth(_)) => {
                *self.session.write().await = None;
                self.publish(AuthEventKind::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn restore_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.server.gate().await?;
        let fresh = self.server.exchange_refresh_token(refresh_token).await?;
        Ok(self.install(AuthEventKind::TokenRefreshed, fresh).await)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.server.gate().await?;
        Ok(self.server.select_rows(table, query).await)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        self.server.gate().await?;
        self.server.insert_row(table, row).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.server.gate().await?;
        self.server.update_rows(table, filters, patch).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, BackendError> {
        self.server.gate().await?;
        Ok(self.server.delete_rows(table, filters).await)
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.server.feed(table)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::id_value;
    use assert_matches::assert_matches;

    async fn seed_tasks(backend: &MemoryBackend) -> (Uuid, Uuid) {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (name, who) in [("a", alice), ("b", bob), ("c", alice)] {
            backend
                .insert(
                    tables::TASK_RECORDS,
                    json!({"task_name": name, "assigned_to": who}),
                )
                .await
                .unwrap();
        }
        (alice, bob)
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn insert_fills_id_and_timestamps() {
        let backend = MemoryBackend::new();
        let row = backend
            .insert(tables::TASK_RECORDS, json!({"task_name": "x"}))
            .await
            .unwrap();
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());
        assert!(row["updated_at"].is_string());

        let log = backend
            .insert(tables::AUDIT_LOGS, json!({"action": "CREATE"}))
            .await
            .unwrap();
        assert!(log["timestamp"].is_string());
        assert!(log.get("created_at").is_none());
    }

    #[tokio::test]
    async fn select_applies_filters_order_and_limit() {
        let backend = MemoryBackend::new();
        let (alice, _) = seed_tasks(&backend).await;

        let query = Query::new()
            .eq("assigned_to", id_value(alice))
            .order_by("task_name", false);
        let rows = backend.select(tables::TASK_RECORDS, &query).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["task_name"].as_str().unwrap()).collect();
        assert_eq!(names, ["c", "a"]);

        let limited = backend
            .select(tables::TASK_RECORDS, &Query::new().limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn contains_and_in_filters() {
        let backend = MemoryBackend::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        backend
            .insert(tables::MEETINGS, json!({"name": "both", "attendees": [a, b]}))
            .await
            .unwrap();
        backend
            .insert(tables::MEETINGS, json!({"name": "only-b", "attendees": [b]}))
            .await
            .unwrap();

        let query = Query::new().filter(Filter::Contains("attendees", json!([a])));
        let rows = backend.select(tables::MEETINGS, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "both");

        let query = Query::new().filter(Filter::In("name", vec![json!("only-b"), json!("zzz")]));
        let rows = backend.select(tables::MEETINGS, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unique_columns_are_enforced() {
        let backend = MemoryBackend::new();
        backend
            .insert(tables::USERS, json!({"username": "kai", "email": "kai@x.test"}))
            .await
            .unwrap();
        let err = backend
            .insert(tables::USERS, json!({"username": "kai", "email": "other@x.test"}))
            .await
            .unwrap_err();
        assert_matches!(err, BackendError::UniqueViolation { ref column, .. } if column == "username");
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() {
        let backend = MemoryBackend::new();
        let (alice, _) = seed_tasks(&backend).await;
        let filters = [Filter::Eq("assigned_to", id_value(alice))];

        let updated = backend
            .update(tables::TASK_RECORDS, &filters, json!({"status": "Done"}))
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|r| r["status"] == "Done"));

        let removed = backend.delete(tables::TASK_RECORDS, &filters).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.row_count(tables::TASK_RECORDS).await, 1);
    }

    #[tokio::test]
    async fn mutations_emit_change_events_per_table() {
        let backend = MemoryBackend::new();
        let mut tasks = backend.subscribe(tables::TASK_RECORDS);
        let mut meetings = backend.subscribe(tables::MEETINGS);

        backend
            .insert(tables::TASK_RECORDS, json!({"task_name": "x"}))
            .await
            .unwrap();

        let event = tasks.recv().await.unwrap();
        assert_eq!(event.table, tables::TASK_RECORDS);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_matches!(
            meetings.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        );
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let backend = MemoryBackend::new();
        let other = backend.new_client();
        backend.set_available(false);
        let err = other
            .select(tables::USERS, &Query::new())
            .await
            .unwrap_err();
        assert_matches!(err, BackendError::Unavailable(_));
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = json!("2026-01-01T10:00:00Z");
        let later = json!("2026-01-01T10:00:00.5Z");
        assert_eq!(compare_values(Some(&earlier), Some(&later)), Ordering::Less);
        assert_eq!(compare_values(None, Some(&later)), Ordering::Greater);
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sign_up_creates_pending_editor_profile() {
        let backend = MemoryBackend::new();
        let user = backend
            .sign_up("Lee@Idyll.test", "secret1", json!({"username": "lee"}))
            .await
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("lee@idyll.test"));

        let rows = backend
            .select(tables::USERS, &Query::new().eq("id", id_value(user.id)))
            .await
            .unwrap();
        assert_eq!(rows[0]["username"], "lee");
        assert_eq!(rows[0]["role"], "EDITOR");
        assert_eq!(rows[0]["status"], "PENDING");
        assert!(backend.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_up_rejects_weak_and_duplicate() {
        let backend = MemoryBackend::new();
        assert_matches!(
            backend.sign_up("a@b.test", "123", Value::Null).await,
            Err(BackendError::Auth(AuthError::WeakPassword(_)))
        );
        backend.sign_up("a@b.test", "123456", Value::Null).await.unwrap();
        assert_matches!(
            backend.sign_up("a@b.test", "654321", Value::Null).await,
            Err(BackendError::Auth(AuthError::DuplicateAccount))
        );
    }

    #[tokio::test]
    async fn sign_in_checks_password_and_emits_event() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@b.test", "123456", Value::Null).await.unwrap();
        let mut events = backend.auth_events();

        assert_matches!(
            backend.sign_in_with_password("a@b.test", "wrong!").await,
            Err(BackendError::Auth(AuthError::InvalidCredentials))
        );

        let session = backend
            .sign_in_with_password("a@b.test", "123456")
            .await
            .unwrap();
        assert_eq!(
            backend.get_session().await.unwrap().map(|s| s.user.id),
            Some(session.user.id)
        );
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedIn);

        backend.sign_out().await.unwrap();
        assert!(backend.get_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_transparently() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@b.test", "123456", Value::Null).await.unwrap();
        backend.set_token_ttl(chrono::Duration::seconds(-60));
        let first = backend
            .sign_in_with_password("a@b.test", "123456")
            .await
            .unwrap();
        let mut events = backend.auth_events();

        backend.set_token_ttl(chrono::Duration::seconds(3600));
        let current = backend.get_session().await.unwrap().unwrap();
        assert_ne!(current.access_token, first.access_token);
        assert_eq!(
            events.recv().await.unwrap().kind,
            AuthEventKind::TokenRefreshed
        );
    }

    #[tokio::test]
    async fn refresh_tokens_restore_and_rotate() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@b.test", "123456", Value::Null).await.unwrap();
        let session = backend
            .sign_in_with_password("a@b.test", "123456")
            .await
            .unwrap();

        let restarted = backend.new_client();
        let restored = restarted
            .restore_session(&session.refresh_token)
            .await
            .unwrap();
        assert_eq!(restored.user.id, session.user.id);
        assert_matches!(
            restarted.restore_session(&session.refresh_token).await,
            Err(BackendError::Auth(AuthError::NotSignedIn))
        );
    }
}
