//! View router.
//!
//! Holds the requested and the effective view. Every change to identity,
//! loading state or the requested view goes through
//! [`resolve_view`]; a redirect rewrites the requested view so the
//! decision converges after one step. The effective view is mirrored into
//! the local store as a `/<view>` location so a restart can restore it.

use std::sync::{Arc, Mutex, PoisonError};

use idyll_core::access::Actor;
use idyll_core::views::{home_view_for, resolve_view, HomeScreen, RouteDecision, ViewId};
use idyll_events::{ClientEvent, EventBus};

use crate::local::{keys, LocalStore};

/// What the presentation layer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Session resolution in progress.
    Loading,
    /// A view rendered without the navigation shell.
    Bare(ViewId),
    /// A view rendered inside the navigation shell.
    Shell(ViewId),
    /// The role-specific home view, inside the shell.
    Home(HomeScreen),
}

#[derive(Debug)]
struct RouterState {
    requested: ViewId,
    current: Option<ViewId>,
}

pub struct ViewRouter {
    local: Arc<LocalStore>,
    bus: Arc<EventBus>,
    state: Mutex<RouterState>,
}

impl ViewRouter {
    /// The initial request comes from `deep_link`, else the persisted
    /// location, else `landing`.
    pub fn new(local: Arc<LocalStore>, bus: Arc<EventBus>, deep_link: Option<&str>) -> Self {
        let requested = deep_link
            .and_then(ViewId::from_location)
            .or_else(|| {
                local
                    .get(keys::LAST_VIEW)
                    .and_then(|location| ViewId::from_location(&location))
            })
            .unwrap_or(ViewId::Landing);
        tracing::debug!(view = %requested, "Initial view requested");
        Self {
            local,
            bus,
            state: Mutex::new(RouterState {
                requested,
                current: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn requested(&self) -> ViewId {
        self.lock().requested
    }

    /// The view being shown, or `None` while deferred.
    pub fn current(&self) -> Option<ViewId> {
        self.lock().current
    }

    pub fn location(&self) -> Option<String> {
        self.current().map(ViewId::to_location)
    }

    /// Request `view` and apply the guard.
    pub fn set_view(&self, view: ViewId, actor: Option<&Actor>, loading: bool) -> RouteDecision {
        self.lock().requested = view;
        self.reconcile(actor, loading)
    }

    /// Request the view named by a location string. Anything outside the
    /// closed set is treated as `landing`.
    pub fn set_location(&self, location: &str, actor: Option<&Actor>, loading: bool) -> RouteDecision {
        let view = ViewId::from_location(location).unwrap_or_else(|| {
            tracing::debug!(location, "Unknown location, falling back to landing");
            ViewId::Landing
        });
        self.set_view(view, actor, loading)
    }

    /// Re-run the guard against the current identity.
    pub fn reconcile(&self, actor: Option<&Actor>, loading: bool) -> RouteDecision {
        let (decision, change) = {
            let mut state = self.lock();
            // Approval while parked on `pending` moves on to `home`.
            if state.requested == ViewId::Pending && actor.is_some_and(Actor::is_approved) {
                state.requested = ViewId::Home;
            }
            let decision = resolve_view(actor, state.requested, loading);
            if let RouteDecision::Redirect { from, to } = decision {
                tracing::info!(from = %from, to = %to, "Redirecting");
                state.requested = to;
            }
            let change = match decision.effective() {
                Some(view) if state.current != Some(view) => {
                    let from = state.current.replace(view);
                    Some((from, view))
                }
                _ => None,
            };
            (decision, change)
        };

        if let Some((from, to)) = change {
            self.local.set(keys::LAST_VIEW, to.to_location());
            self.bus.publish(ClientEvent::ViewChanged { from, to });
        }
        decision
    }

    /// After sign-in or sign-up, leave the public entry views for `home`.
    pub fn on_authenticated(&self, actor: Option<&Actor>, loading: bool) -> RouteDecision {
        {
            let mut state = self.lock();
            if matches!(state.requested, ViewId::Login | ViewId::Signup | ViewId::Landing) {
                state.requested = ViewId::Home;
            }
        }
        self.reconcile(actor, loading)
    }

    pub fn on_signed_out(&self) -> RouteDecision {
        self.set_view(ViewId::Landing, None, false)
    }

    pub fn screen(&self, actor: Option<&Actor>, loading: bool) -> Screen {
        if loading {
            return Screen::Loading;
        }
        match (self.current(), actor) {
            (None, _) => Screen::Loading,
            (Some(ViewId::Home), Some(actor)) => Screen::Home(home_view_for(actor)),
            (Some(view), _) if view.shows_layout() => Screen::Shell(view),
            (Some(view), _) => Screen::Bare(view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_core::roles::{ApprovalStatus, Role};
    use uuid::Uuid;

    fn router(deep_link: Option<&str>, local: Arc<LocalStore>) -> (ViewRouter, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        (ViewRouter::new(local, Arc::clone(&bus), deep_link), bus)
    }

    fn actor(role: Role, status: ApprovalStatus) -> Actor {
        Actor::new(Uuid::new_v4(), role, status)
    }

    #[test]
    fn deep_link_wins_over_persisted_location() {
        let local = Arc::new(LocalStore::in_memory());
        local.set(keys::LAST_VIEW, "/meetings");
        let (from_link, _) = router(Some("/#/tasks"), Arc::clone(&local));
        assert_eq!(from_link.requested(), ViewId::Tasks);

        let (from_store, _) = router(None, Arc::clone(&local));
        assert_eq!(from_store.requested(), ViewId::Meetings);

        let (fresh, _) = router(Some("/nowhere"), Arc::new(LocalStore::in_memory()));
        assert_eq!(fresh.requested(), ViewId::Landing);
    }

    #[test]
    fn loading_defers_without_touching_the_view() {
        let (router, _) = router(Some("/tasks"), Arc::new(LocalStore::in_memory()));
        assert_eq!(router.reconcile(None, true), RouteDecision::Defer);
        assert_eq!(router.current(), None);
        assert_eq!(router.screen(None, true), Screen::Loading);
    }

    #[test]
    fn redirect_rewrites_request_and_persists_location() {
        let local = Arc::new(LocalStore::in_memory());
        let (router, bus) = router(Some("/approvals"), Arc::clone(&local));
        let mut rx = bus.subscribe();
        let editor = actor(Role::Editor, ApprovalStatus::Approved);

        let decision = router.reconcile(Some(&editor), false);
        assert_eq!(
            decision,
            RouteDecision::Redirect {
                from: ViewId::Approvals,
                to: ViewId::Home
            }
        );
        assert_eq!(router.requested(), ViewId::Home);
        assert_eq!(local.get(keys::LAST_VIEW).as_deref(), Some("/home"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::ViewChanged {
                from: None,
                to: ViewId::Home
            }
        );

        // Converged: a second pass allows and publishes nothing.
        assert_eq!(router.reconcile(Some(&editor), false), RouteDecision::Allow(ViewId::Home));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn authentication_leaves_entry_views() {
        let (router, _) = router(Some("/login"), Arc::new(LocalStore::in_memory()));
        router.reconcile(None, false);
        let manager = actor(Role::Manager, ApprovalStatus::Approved);
        router.on_authenticated(Some(&manager), false);
        assert_eq!(router.current(), Some(ViewId::Home));
        assert_eq!(
            router.screen(Some(&manager), false),
            Screen::Home(HomeScreen::SystemOverview)
        );
    }

    #[test]
    fn pending_identity_is_held_on_pending() {
        let (router, _) = router(Some("/tasks"), Arc::new(LocalStore::in_memory()));
        let pending = actor(Role::Editor, ApprovalStatus::Pending);
        router.on_authenticated(Some(&pending), false);
        assert_eq!(router.current(), Some(ViewId::Pending));
        assert_eq!(router.screen(Some(&pending), false), Screen::Bare(ViewId::Pending));

        let approved = Actor::new(pending.id, Role::Editor, ApprovalStatus::Approved);
        router.reconcile(Some(&approved), false);
        assert_eq!(
            router.screen(Some(&approved), false),
            Screen::Home(HomeScreen::PersonalDashboard)
        );
    }

    #[test]
    fn sign_out_forces_landing() {
        let (router, _) = router(Some("/settings"), Arc::new(LocalStore::in_memory()));
        let editor = actor(Role::Editor, ApprovalStatus::Approved);
        router.reconcile(Some(&editor), false);
        assert_eq!(router.screen(Some(&editor), false), Screen::Shell(ViewId::Settings));
        router.on_signed_out();
        assert_eq!(router.current(), Some(ViewId::Landing));
    }

    #[test]
    fn unknown_location_is_normalized() {
        let (router, _) = router(None, Arc::new(LocalStore::in_memory()));
        let decision = router.set_location("/admin/secret", None, false);
        assert_eq!(decision, RouteDecision::Allow(ViewId::Landing));
    }
}
