//! HTTP backend for a hosted auth service (`/auth/v1`) and a PostgREST
//! table API (`/rest/v1`).
//!
//! Every request carries the project API key in the `apikey` header and a
//! bearer token: the signed-in session's access token when there is one,
//! otherwise the API key itself. Change subscriptions are served by
//! [`poll`], which re-reads a table on an interval and diffs row
//! fingerprints.

mod auth;
mod poll;
mod postgrest;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use idyll_core::change::ChangeEvent;

use crate::backend::{AuthEvent, BackendError, ChangeFeed, Session};

const CHANNEL_CAPACITY: usize = 64;

/// Connection settings for [`RestBackend`].
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub base_url: String,
    /// Public (anon) or service API key.
    pub api_key: String,
    pub request_timeout: Duration,
    /// How often subscribed tables are re-read for changes.
    pub poll_interval: Duration,
}

struct Inner {
    client: reqwest::Client,
    config: RestConfig,
    session: RwLock<Option<Session>>,
    auth_events: broadcast::Sender<AuthEvent>,
    feeds: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    cancel: CancellationToken,
}

/// Remote store client. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<Inner>,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (auth_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                session: RwLock::new(None),
                auth_events,
                feeds: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Stop every change poller.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base())
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base())
    }

    /// A request carrying the API key and the current bearer token.
    async fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let bearer = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.config.api_key.clone(),
        };
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }
}

/// Return the response unchanged on 2xx, otherwise its status and body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(BackendError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

impl ChangeFeed for RestBackend {
    /// Must be called from within a Tokio runtime.
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut feeds = self
            .inner
            .feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = feeds.get(table) {
            // A sender with no receivers belongs to a poller that is exiting.
            if sender.receiver_count() > 0 {
                return sender.subscribe();
            }
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        feeds.insert(table.to_string(), sender.clone());
        poll::spawn_poller(Arc::clone(&self.inner), table.to_string(), sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: &str) -> RestBackend {
        RestBackend::new(RestConfig {
            base_url: base_url.into(),
            api_key: "anon".into(),
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
        })
        .unwrap()
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let rest = backend("https://project.example.co/");
        assert_eq!(
            rest.inner.auth_url("token?grant_type=password"),
            "https://project.example.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(
            rest.inner.rest_url("task_records"),
            "https://project.example.co/rest/v1/task_records"
        );
    }
}
