//! Auth capability over the hosted auth HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use idyll_core::error::AuthError;

use super::{ensure_success, Inner, RestBackend};
use crate::backend::{AuthBackend, AuthEvent, AuthEventKind, AuthUser, BackendError, Session};

/// Refresh tokens this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let now = Utc::now();
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            })
            .unwrap_or(now);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Map an auth API failure onto the auth error taxonomy.
fn classify_auth_failure(status: u16, body: &str) -> BackendError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .as_deref()
        .or(parsed.error.as_deref())
        .unwrap_or_default()
        .to_string();
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .unwrap_or_else(|| body.to_string());

    let auth = match code.as_str() {
        "user_already_exists" | "email_exists" => Some(AuthError::DuplicateAccount),
        "weak_password" => Some(AuthError::WeakPassword(message.clone())),
        "invalid_credentials" | "invalid_grant" => Some(AuthError::InvalidCredentials),
        "refresh_token_not_found" | "refresh_token_already_used" | "session_not_found" => {
            Some(AuthError::NotSignedIn)
        }
        _ if message.contains("already registered") => Some(AuthError::DuplicateAccount),
        _ if message.starts_with("Password should") => {
            Some(AuthError::WeakPassword(message.clone()))
        }
        _ => None,
    };
    match auth {
        Some(auth) => BackendError::Auth(auth),
        None => BackendError::Api {
            status,
            body: body.to_string(),
        },
    }
}

async fn auth_response(response: reqwest::Response) -> Result<Value, BackendError> {
    match ensure_success(response).await {
        Ok(response) => Ok(response.json::<Value>().await?),
        Err(BackendError::Api { status, body }) if status < 500 => {
            Err(classify_auth_failure(status, &body))
        }
        Err(e) => Err(e),
    }
}

impl Inner {
    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let response = self
            .client
            .post(self.auth_url(&format!("token?grant_type={grant_type}")))
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = serde_json::from_value(auth_response(response).await?)?;
        Ok(token.into_session())
    }

    async fn install(&self, kind: AuthEventKind, session: Session) -> Session {
        *self.session.write().await = Some(session.clone());
        let _ = self
            .auth_events
            .send(AuthEvent::new(kind, Some(session.clone())));
        session
    }

    async fn clear(&self) {
        *self.session.write().await = None;
        let _ = self
            .auth_events
            .send(AuthEvent::new(AuthEventKind::SignedOut, None));
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthUser, BackendError> {
        let inner = &self.inner;
        let response = inner
            .client
            .post(inner.auth_url("signup"))
            .header("apikey", &inner.config.api_key)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        let body = auth_response(response).await?;
        // With auto-confirm on, the service answers with a full session.
        let user = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        Ok(serde_json::from_value(user)?)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let session = self
            .inner
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::debug!(user_id = %session.user.id, "Signed in");
        Ok(self.inner.install(AuthEventKind::SignedIn, session).await)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let inner = &self.inner;
        let has_session = inner.session.read().await.is_some();
        if has_session {
            let request = inner
                .request(reqwest::Method::POST, inner.auth_url("logout"))
                .await;
            match request.send().await.map_err(BackendError::from) {
                Ok(response) => {
                    if let Err(e) = ensure_success(response).await {
                        tracing::warn!(error = %e, "Remote sign-out rejected");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Remote sign-out failed"),
            }
        }
        inner.clear().await;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let current = self.inner.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };
        let margin = chrono::Duration::seconds(EXPIRY_MARGIN_SECS);
        if !session.expires_within(Utc::now(), margin) {
            return Ok(Some(session));
        }
        let grant = json!({ "refresh_token": session.refresh_token });
        match self.inner.token_grant("refresh_token", grant).await {
            Ok(fresh) => Ok(Some(
                self.inner
                    .install(AuthEventKind::TokenRefreshed, fresh)
                    .await,
            )),
            Err(BackendError::Auth(e)) => {
                tracing::info!(error = %e, "Session could not be refreshed");
                self.inner.clear().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn restore_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let grant = json!({ "refresh_token": refresh_token });
        let fresh = self.inner.token_grant("refresh_token", grant).await?;
        Ok(self
            .inner
            .install(AuthEventKind::TokenRefreshed, fresh)
            .await)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_events.subscribe()
    }
}
