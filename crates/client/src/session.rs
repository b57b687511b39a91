//! Session store.
//!
//! Owns the authenticated identity: credential exchange with the auth
//! capability, profile resolution against the `users` table, and the
//! `loading` flag that holds the router in its deferred state until the
//! first resolution finishes (or times out).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::RwLock;
use validator::Validate;

use idyll_core::access::Actor;
use idyll_core::error::{AuthError, CoreError, CoreResult};
use idyll_db::backend::{AuthEvent, AuthEventKind, AuthUser, BackendError, Session, SharedBackend};
use idyll_db::models::user::{NewUser, User};
use idyll_db::repositories::UserRepo;
use idyll_events::{ClientEvent, EventBus};

use crate::local::{keys, LocalStore};

#[derive(Debug, Validate)]
struct SignUpRequest {
    #[validate(email(message = "A valid email is required"))]
    email: String,
    #[validate(length(min = 6, message = "Password should be at least 6 characters"))]
    password: String,
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
}

impl SignUpRequest {
    fn check(&self) -> CoreResult<()> {
        let Err(errors) = self.validate() else {
            return Ok(());
        };
        let fields = errors.field_errors();
        if let Some(password) = fields.get("password") {
            let message = password
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Password is too short".to_string());
            return Err(AuthError::WeakPassword(message).into());
        }
        Err(CoreError::validation(errors.to_string()))
    }
}

#[derive(Debug, Clone)]
struct SessionState {
    session: Option<Session>,
    user: Option<User>,
    loading: bool,
    /// Bumped whenever the identity is replaced or cleared. A reload that
    /// started under an older epoch must not install its result.
    epoch: u64,
}

pub struct SessionStore {
    backend: SharedBackend,
    local: Arc<LocalStore>,
    bus: Arc<EventBus>,
    state: RwLock<SessionState>,
    resolve_timeout: Duration,
}

impl SessionStore {
    pub fn new(
        backend: SharedBackend,
        local: Arc<LocalStore>,
        bus: Arc<EventBus>,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            local,
            bus,
            state: RwLock::new(SessionState {
                session: None,
                user: None,
                loading: true,
                epoch: 0,
            }),
            resolve_timeout,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn actor(&self) -> Option<Actor> {
        self.state.read().await.user.as_ref().map(User::actor)
    }

    pub async fn loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    // -----------------------------------------------------------------------
    // Initial resolution
    // -----------------------------------------------------------------------

    /// Resolve the persisted session, bounded by the configured timeout.
    ///
    /// Whatever happens, `loading` is false afterwards. A timeout or remote
    /// failure leaves the client unauthenticated.
    pub async fn initialize(&self) -> Option<User> {
        let resolved = match tokio::time::timeout(self.resolve_timeout, self.resolve_initial()).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Session resolution failed");
                None
            }
            Err(_) => {
                let e = CoreError::Timeout(self.resolve_timeout);
                tracing::warn!(error = %e, "Session resolution timed out");
                None
            }
        };

        let (session, user) = match resolved {
            Some((session, user)) => (Some(session), Some(user)),
            None => (None, None),
        };
        let user_id = user.as_ref().map(|u| u.id);
        {
            let mut state = self.state.write().await;
            state.session = session;
            state.user = user.clone();
            state.loading = false;
        }
        tracing::info!(user_id = ?user_id, "Session resolved");
        self.bus.publish(ClientEvent::SessionChanged { user_id });
        user
    }

    async fn resolve_initial(&self) -> CoreResult<Option<(Session, User)>> {
        let session = match self.backend.get_session().await? {
            Some(session) => session,
            None => match self.restore_persisted().await? {
                Some(session) => session,
                None => return Ok(None),
            },
        };
        self.remember_refresh_token(&session);
        let user = self.resolve_profile(&session.user).await?;
        Ok(Some((session, user)))
    }

    async fn restore_persisted(&self) -> CoreResult<Option<Session>> {
        let Some(token) = self.local.get(keys::REFRESH_TOKEN) else {
            return Ok(None);
        };
        match self.backend.restore_session(&token).await {
            Ok(session) => Ok(Some(session)),
            Err(BackendError::Auth(e)) => {
                tracing::info!(error = %e, "Persisted session is no longer valid");
                self.local.remove(keys::REFRESH_TOKEN);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the profile of `auth`, creating a provisional one if the row
    /// is missing.
    async fn resolve_profile(&self, auth: &AuthUser) -> CoreResult<User> {
        if let Some(user) = UserRepo::find_by_id(&*self.backend, auth.id).await? {
            return Ok(user);
        }

        let profile = NewUser::provisional(auth);
        tracing::info!(user_id = %auth.id, username = %profile.username, "Creating missing profile");
        match UserRepo::create(&*self.backend, &profile).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_unique_violation() => {
                // Lost a race with the sign-up trigger.
                tracing::debug!(user_id = %auth.id, "Profile already created");
                let existing = UserRepo::find_by_id(&*self.backend, auth.id).await?;
                Ok(existing.unwrap_or_else(|| profile.into_user()))
            }
            Err(e) => {
                tracing::warn!(user_id = %auth.id, error = %e, "Using unsaved profile");
                Ok(profile.into_user())
            }
        }
    }

    fn remember_refresh_token(&self, session: &Session) {
        if self.local.get(keys::REFRESH_TOKEN).as_deref() != Some(session.refresh_token.as_str()) {
            self.local.set(keys::REFRESH_TOKEN, session.refresh_token.clone());
        }
    }

    async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    async fn install(&self, session: Session, user: User) {
        let user_id = user.id;
        {
            let mut state = self.state.write().await;
            state.session = Some(session);
            state.user = Some(user);
            state.loading = false;
            state.epoch += 1;
        }
        self.bus.publish(ClientEvent::SessionChanged {
            user_id: Some(user_id),
        });
    }

    /// Store a re-read session and profile unless the identity was replaced
    /// or cleared since `epoch`. Returns whether the result was kept.
    async fn adopt(&self, epoch: u64, session: Session, user: &User) -> bool {
        let changed = {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                tracing::debug!(user_id = %user.id, "Discarding profile reload from a previous session");
                return false;
            }
            self.remember_refresh_token(&session);
            let changed = state.user.as_ref() != Some(user);
            state.session = Some(session);
            state.user = Some(user.clone());
            state.loading = false;
            changed
        };
        if changed {
            self.bus.publish(ClientEvent::SessionChanged {
                user_id: Some(user.id),
            });
        }
        true
    }

    async fn clear(&self) {
        let had_user = {
            let mut state = self.state.write().await;
            self.local.remove(keys::REFRESH_TOKEN);
            let had_user = state.user.is_some() || state.session.is_some();
            state.session = None;
            state.user = None;
            state.loading = false;
            state.epoch += 1;
            had_user
        };
        if had_user {
            self.bus.publish(ClientEvent::SessionChanged { user_id: None });
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Register a new account. The profile starts as a pending editor; the
    /// caller is not signed in.
    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> CoreResult<()> {
        let request = SignUpRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            username: username.trim().to_string(),
        };
        request.check()?;

        if UserRepo::find_by_username(&*self.backend, &request.username)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateAccount.into());
        }

        let auth = self
            .backend
            .sign_up(
                &request.email,
                &request.password,
                json!({ "username": request.username }),
            )
            .await?;
        tracing::info!(user_id = %auth.id, username = %request.username, "Account registered");
        Ok(())
    }

    /// Sign in with an email or a username.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> CoreResult<User> {
        let identifier = identifier.trim();
        let email = if identifier.contains('@') {
            identifier.to_string()
        } else {
            UserRepo::find_by_username(&*self.backend, identifier)
                .await?
                .map(|user| user.email)
                .filter(|email| !email.is_empty())
                .ok_or(AuthError::InvalidCredentials)?
        };

        let session = self.backend.sign_in_with_password(&email, password).await?;
        self.remember_refresh_token(&session);
        let user = self.resolve_profile(&session.user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "Signed in");
        self.install(session, user.clone()).await;
        Ok(user)
    }

    /// Sign out locally even if the remote call fails.
    pub async fn sign_out(&self) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }
        self.clear().await;
        tracing::info!("Signed out");
    }

    /// Re-read the session and profile, e.g. after a role change.
    ///
    /// Returns `None` when there is no session, or when the identity was
    /// signed out or replaced while the reload was in flight.
    pub async fn reload_profile(&self) -> CoreResult<Option<User>> {
        let epoch = self.epoch().await;
        let Some(session) = self.backend.get_session().await? else {
            if self.epoch().await == epoch {
                self.clear().await;
            }
            return Ok(None);
        };
        let user = self.resolve_profile(&session.user).await?;
        Ok(self.adopt(epoch, session, &user).await.then_some(user))
    }

    /// React to a session change pushed by the auth capability.
    pub async fn handle_auth_event(&self, event: AuthEvent) -> CoreResult<()> {
        tracing::debug!(kind = ?event.kind, "Auth event");
        match (event.kind, event.session) {
            (AuthEventKind::SignedOut, _) | (_, None) => {
                self.clear().await;
            }
            (kind @ (AuthEventKind::TokenRefreshed | AuthEventKind::UserUpdated), Some(_))
                if !self.is_authenticated().await =>
            {
                tracing::debug!(kind = ?kind, "Ignoring auth event after sign-out");
            }
            (_, Some(session)) => {
                let epoch = self.epoch().await;
                let user = self.resolve_profile(&session.user).await?;
                self.adopt(epoch, session, &user).await;
            }
        }
        Ok(())
    }
}
