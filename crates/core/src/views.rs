//! The closed set of navigable views and the route guard over it.
//!
//! [`resolve_view`] is the only place that decides whether a requested view
//! may be shown. It is pure and total: every input combination yields a
//! decision, and feeding the effective view of a decision back in as the
//! requested view yields the same decision again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::Actor;
use crate::roles::Role;

// ---------------------------------------------------------------------------
// ViewId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewId {
    Landing,
    Login,
    Signup,
    Apply,
    Pending,
    Home,
    Tasks,
    Meetings,
    Payouts,
    Approvals,
    UserManagement,
    Settings,
}

/// Views reachable without a session.
pub const PUBLIC_VIEWS: [ViewId; 4] = [ViewId::Landing, ViewId::Login, ViewId::Signup, ViewId::Apply];

/// Views reachable by an identity that is not yet approved.
pub const UNAPPROVED_VIEWS: [ViewId; 5] = [
    ViewId::Pending,
    ViewId::Landing,
    ViewId::Login,
    ViewId::Signup,
    ViewId::Apply,
];

/// Views an editor is redirected away from.
pub const MANAGER_ONLY_VIEWS: [ViewId; 2] = [ViewId::Approvals, ViewId::UserManagement];

impl ViewId {
    pub const ALL: [ViewId; 12] = [
        ViewId::Landing,
        ViewId::Login,
        ViewId::Signup,
        ViewId::Apply,
        ViewId::Pending,
        ViewId::Home,
        ViewId::Tasks,
        ViewId::Meetings,
        ViewId::Payouts,
        ViewId::Approvals,
        ViewId::UserManagement,
        ViewId::Settings,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ViewId::Landing => "landing",
            ViewId::Login => "login",
            ViewId::Signup => "signup",
            ViewId::Apply => "apply",
            ViewId::Pending => "pending",
            ViewId::Home => "home",
            ViewId::Tasks => "tasks",
            ViewId::Meetings => "meetings",
            ViewId::Payouts => "payouts",
            ViewId::Approvals => "approvals",
            ViewId::UserManagement => "user-management",
            ViewId::Settings => "settings",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.as_str() == name)
    }

    /// Read a view back from a location string such as `/tasks`, `#tasks`
    /// or `/#/meetings`. A non-empty fragment wins over the path. Anything
    /// outside the closed set yields `None`.
    pub fn from_location(location: &str) -> Option<Self> {
        let candidate = match location.split_once('#') {
            Some((_, fragment)) if !fragment.trim_matches('/').is_empty() => fragment,
            Some((path, _)) => path,
            None => location,
        };
        let candidate = candidate.split(['?', '&']).next().unwrap_or_default();
        Self::parse(candidate.trim_matches('/'))
    }

    pub fn to_location(self) -> String {
        format!("/{}", self.as_str())
    }

    pub fn is_public(self) -> bool {
        PUBLIC_VIEWS.contains(&self)
    }

    /// Whether the view renders inside the navigation shell.
    pub fn shows_layout(self) -> bool {
        !UNAPPROVED_VIEWS.contains(&self)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Route decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session resolution is in progress; render a loading state.
    Defer,
    /// The requested view is permitted.
    Allow(ViewId),
    /// The requested view is not permitted for this identity.
    Redirect { from: ViewId, to: ViewId },
}

impl RouteDecision {
    /// The view to render, if any.
    pub fn effective(self) -> Option<ViewId> {
        match self {
            RouteDecision::Defer => None,
            RouteDecision::Allow(view) => Some(view),
            RouteDecision::Redirect { to, .. } => Some(to),
        }
    }
}

pub fn resolve_view(actor: Option<&Actor>, requested: ViewId, loading: bool) -> RouteDecision {
    if loading {
        return RouteDecision::Defer;
    }

    let redirect_to = match actor {
        Some(actor) if !actor.is_approved() => {
            (!UNAPPROVED_VIEWS.contains(&requested)).then_some(ViewId::Pending)
        }
        None => (!PUBLIC_VIEWS.contains(&requested)).then_some(ViewId::Landing),
        Some(actor) if actor.role == Role::Editor => {
            MANAGER_ONLY_VIEWS.contains(&requested).then_some(ViewId::Home)
        }
        Some(_) => None,
    };

    match redirect_to {
        Some(to) if to != requested => RouteDecision::Redirect {
            from: requested,
            to,
        },
        _ => RouteDecision::Allow(requested),
    }
}

// ---------------------------------------------------------------------------
// Home
// ---------------------------------------------------------------------------

/// What the `home` view renders for a given role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeScreen {
    SystemOverview,
    PersonalDashboard,
}

pub fn home_view_for(actor: &Actor) -> HomeScreen {
    match actor.role {
        Role::Manager => HomeScreen::SystemOverview,
        Role::Editor => HomeScreen::PersonalDashboard,
    }
}
