//! Application context.
//!
//! [`AppContext`] is built once at process start and cloned into every
//! consumer. It wires the stores together and owns the command pipeline:
//! session changes drive the record store, refreshes drive the projector,
//! and every state change ends with the router re-checking the view.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use idyll_core::access::Actor;
use idyll_core::audit::AuditAction;
use idyll_core::error::{AuthError, CoreResult};
use idyll_core::preferences::{CookieConsent, Theme};
use idyll_core::roles::Role;
use idyll_core::types::EntityId;
use idyll_core::views::{RouteDecision, ViewId};
use idyll_db::backend::{AuthEvent, SharedBackend};
use idyll_db::models::meeting::{Meeting, MeetingField, NewMeeting};
use idyll_db::models::notification::Notification;
use idyll_db::models::payout_record::{NewPayoutRecord, PayoutRecord, PayoutRecordField};
use idyll_db::models::submission::{NewSubmission, SubmissionStatus, UserSubmission};
use idyll_db::models::table::{RecordTable, TableKind};
use idyll_db::models::task_record::{NewTaskRecord, TaskRecord, TaskRecordField};
use idyll_db::models::user::{User, UserField};
use idyll_events::{ClientEvent, EventBus};

use crate::config::ClientConfig;
use crate::dashboard::{self, HomeStats};
use crate::local::LocalStore;
use crate::preferences::{self, Preferences};
use crate::projector::NotificationProjector;
use crate::records::{RecordStore, RefreshReport, StoreSnapshot};
use crate::router::{Screen, ViewRouter};
use crate::session::SessionStore;
use crate::sync::{self, SyncHandle};

#[derive(Clone)]
pub struct AppContext {
    config: Arc<ClientConfig>,
    backend: SharedBackend,
    bus: Arc<EventBus>,
    local: Arc<LocalStore>,
    session: Arc<SessionStore>,
    records: Arc<RecordStore>,
    router: Arc<ViewRouter>,
    projector: Arc<NotificationProjector>,
    refresh_gate: Arc<Mutex<()>>,
}

impl AppContext {
    /// `deep_link` is the location the client was opened at, if any.
    pub fn new(
        config: ClientConfig,
        backend: SharedBackend,
        local: LocalStore,
        deep_link: Option<&str>,
    ) -> Self {
        let bus = Arc::new(EventBus::default());
        let local = Arc::new(local);
        let session = SessionStore::new(
            Arc::clone(&backend),
            Arc::clone(&local),
            Arc::clone(&bus),
            config.session_timeout,
        );
        let records = RecordStore::new(Arc::clone(&backend), Arc::clone(&bus), config.audit_log_limit);
        let router = ViewRouter::new(Arc::clone(&local), Arc::clone(&bus), deep_link);
        let projector = NotificationProjector::new(Arc::clone(&local), Arc::clone(&bus));

        Self {
            config: Arc::new(config),
            backend,
            bus,
            local,
            session: Arc::new(session),
            records: Arc::new(records),
            router: Arc::new(router),
            projector: Arc::new(projector),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn router(&self) -> &ViewRouter {
        &self.router
    }

    pub fn projector(&self) -> &NotificationProjector {
        &self.projector
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session.current_user().await
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.records.snapshot().await
    }

    async fn require_user(&self) -> CoreResult<User> {
        self.session
            .current_user()
            .await
            .ok_or_else(|| AuthError::NotSignedIn.into())
    }

    async fn route_inputs(&self) -> (Option<Actor>, bool) {
        (self.session.actor().await, self.session.loading().await)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Resolve the persisted session and hydrate the stores.
    pub async fn initialize(&self) -> Option<User> {
        self.router.reconcile(None, true);
        let user = self.session.initialize().await;
        if user.is_some() {
            self.refresh().await;
        } else {
            self.router.reconcile(None, false);
        }
        user
    }

    /// Re-read identity and every collection, then update the feed and
    /// the view. At most one refresh runs at a time.
    pub async fn refresh(&self) -> RefreshReport {
        let _gate = self.refresh_gate.lock().await;

        if self.session.is_authenticated().await {
            if let Err(e) = self.session.reload_profile().await {
                tracing::warn!(error = %e, "Profile reload failed, keeping cached identity");
            }
        }
        let user = self.session.current_user().await;
        let actor = user.as_ref().map(User::actor);

        let report = self.records.fetch_all(actor.as_ref()).await;
        if let Some(user) = &user {
            let snapshot = self.records.snapshot().await;
            self.projector.observe(user, &snapshot);
        }
        self.router
            .reconcile(actor.as_ref(), self.session.loading().await);
        report
    }

    /// Start listening for remote changes.
    pub fn subscribe_to_changes(&self) -> SyncHandle {
        sync::spawn(self.clone())
    }

    pub(crate) async fn handle_auth_event(&self, event: AuthEvent) {
        let _gate = self.refresh_gate.lock().await;
        if let Err(e) = self.session.handle_auth_event(event).await {
            tracing::warn!(error = %e, "Failed to apply auth event");
        }
        let (actor, loading) = self.route_inputs().await;
        if actor.is_none() {
            self.records.clear().await;
            self.projector.reset();
        }
        self.router.reconcile(actor.as_ref(), loading);
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> CoreResult<()> {
        self.session.sign_up(email, password, username).await
    }

    pub async fn sign_in(&self, identifier: &str, password: &str) -> CoreResult<User> {
        let user = self.session.sign_in(identifier, password).await?;
        self.records.record_session_event(&user, AuditAction::Login).await;
        let (actor, loading) = self.route_inputs().await;
        self.router.on_authenticated(actor.as_ref(), loading);
        self.refresh().await;
        Ok(user)
    }

    /// Waits for an in-flight refresh so it cannot repopulate the stores.
    pub async fn sign_out(&self) {
        let _gate = self.refresh_gate.lock().await;
        if let Some(user) = self.session.current_user().await {
            self.records.record_session_event(&user, AuditAction::Logout).await;
        }
        self.session.sign_out().await;
        self.records.clear().await;
        self.projector.reset();
        self.router.on_signed_out();
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub async fn set_view(&self, view: ViewId) -> RouteDecision {
        let (actor, loading) = self.route_inputs().await;
        self.router.set_view(view, actor.as_ref(), loading)
    }

    pub async fn set_location(&self, location: &str) -> RouteDecision {
        let (actor, loading) = self.route_inputs().await;
        self.router.set_location(location, actor.as_ref(), loading)
    }

    pub async fn screen(&self) -> Screen {
        let (actor, loading) = self.route_inputs().await;
        self.router.screen(actor.as_ref(), loading)
    }

    /// Statistics for the home view; `None` when signed out.
    pub async fn home_stats(&self, selected: Option<EntityId>) -> Option<HomeStats> {
        let actor = self.session.actor().await?;
        let snapshot = self.records.snapshot().await;
        Some(dashboard::home_stats(&actor, &snapshot, selected))
    }

    // -----------------------------------------------------------------------
    // Preferences
    // -----------------------------------------------------------------------

    pub async fn preferences(&self) -> Preferences {
        let user = self.session.current_user().await;
        Preferences::resolve(user.as_ref(), &self.local)
    }

    pub async fn toggle_theme(&self) -> CoreResult<Theme> {
        let theme = self.preferences().await.theme.toggled();
        self.save_preferences(UserField::Theme(theme), |prefs| prefs.theme = theme)
            .await?;
        Ok(theme)
    }

    pub async fn set_sound_enabled(&self, enabled: bool) -> CoreResult<()> {
        self.save_preferences(UserField::SoundEnabled(enabled), |prefs| {
            prefs.sound_enabled = enabled
        })
        .await
    }

    async fn save_preferences(
        &self,
        field: UserField,
        apply: impl FnOnce(&mut Preferences),
    ) -> CoreResult<()> {
        match self.session.current_user().await {
            Some(user) => {
                self.records.update_user(&user, user.id, vec![field]).await?;
                self.session.reload_profile().await?;
            }
            None => {
                let mut prefs = Preferences::resolve(None, &self.local);
                apply(&mut prefs);
                prefs.store_local(&self.local);
            }
        }
        Ok(())
    }

    pub fn cookie_consent(&self) -> Option<CookieConsent> {
        preferences::cookie_consent(&self.local)
    }

    pub fn set_cookie_consent(&self, consent: CookieConsent) {
        preferences::set_cookie_consent(&self.local, consent);
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub async fn create_table(&self, kind: TableKind, name: &str) -> CoreResult<RecordTable> {
        let user = self.require_user().await?;
        self.records.create_table(&user, kind, name).await
    }

    pub async fn delete_table(&self, kind: TableKind, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_table(&user, kind, id).await
    }

    pub async fn add_task(&self, input: NewTaskRecord) -> CoreResult<TaskRecord> {
        let user = self.require_user().await?;
        self.records.add_task(&user, input).await
    }

    pub async fn update_task(&self, id: EntityId, fields: Vec<TaskRecordField>) -> CoreResult<TaskRecord> {
        let user = self.require_user().await?;
        self.records.update_task(&user, id, fields).await
    }

    pub async fn delete_task(&self, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_task(&user, id).await
    }

    pub async fn add_payout(&self, input: NewPayoutRecord) -> CoreResult<PayoutRecord> {
        let user = self.require_user().await?;
        self.records.add_payout(&user, input).await
    }

    pub async fn update_payout(
        &self,
        id: EntityId,
        fields: Vec<PayoutRecordField>,
    ) -> CoreResult<PayoutRecord> {
        let user = self.require_user().await?;
        self.records.update_payout(&user, id, fields).await
    }

    pub async fn delete_payout(&self, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_payout(&user, id).await
    }

    pub async fn add_meeting(&self, input: NewMeeting) -> CoreResult<Meeting> {
        let user = self.require_user().await?;
        self.records.add_meeting(&user, input).await
    }

    pub async fn update_meeting(&self, id: EntityId, fields: Vec<MeetingField>) -> CoreResult<Meeting> {
        let user = self.require_user().await?;
        self.records.update_meeting(&user, id, fields).await
    }

    pub async fn delete_meeting(&self, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_meeting(&user, id).await
    }

    pub async fn update_user(&self, id: EntityId, fields: Vec<UserField>) -> CoreResult<User> {
        let user = self.require_user().await?;
        self.records.update_user(&user, id, fields).await
    }

    pub async fn approve_user(&self, id: EntityId) -> CoreResult<User> {
        let user = self.require_user().await?;
        self.records.approve_user(&user, id).await
    }

    pub async fn reject_user(&self, id: EntityId) -> CoreResult<User> {
        let user = self.require_user().await?;
        self.records.reject_user(&user, id).await
    }

    pub async fn set_role(&self, id: EntityId, role: Role) -> CoreResult<User> {
        let user = self.require_user().await?;
        self.records.set_role(&user, id, role).await
    }

    pub async fn delete_user(&self, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_user(&user, id).await
    }

    pub async fn mark_notification_read(&self, id: EntityId) -> CoreResult<Notification> {
        let user = self.require_user().await?;
        self.records.mark_notification_read(&user, id).await
    }

    /// Mark every notification row read and advance the feed watermark.
    pub async fn mark_all_notifications_read(&self) -> CoreResult<usize> {
        let user = self.require_user().await?;
        let marked = self.records.mark_all_notifications_read(&user).await?;
        self.projector.mark_all_read();
        Ok(marked)
    }

    pub fn clear_notification_feed(&self) {
        self.projector.clear_all();
    }

    pub async fn clear_audit_log(&self) -> CoreResult<usize> {
        let user = self.require_user().await?;
        self.records.clear_audit_log(&user).await
    }

    pub async fn submit_application(&self, input: NewSubmission) -> CoreResult<UserSubmission> {
        self.records.submit_application(input).await
    }

    pub async fn update_submission_status(
        &self,
        id: EntityId,
        status: SubmissionStatus,
    ) -> CoreResult<UserSubmission> {
        let user = self.require_user().await?;
        self.records.update_submission_status(&user, id, status).await
    }

    pub async fn delete_submission(&self, id: EntityId) -> CoreResult<()> {
        let user = self.require_user().await?;
        self.records.delete_submission(&user, id).await
    }
}
