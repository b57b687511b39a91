//! Client core of the Idyll production workspace.
//!
//! An [`AppContext`] is built once at process start and owns every store:
//!
//! - [`session::SessionStore`]: identity, sign-in/up/out, profile fallback
//! - [`records::RecordStore`]: role-scoped collections and gated commands
//! - [`router::ViewRouter`]: the current view, guarded by `resolve_view`
//! - [`projector::NotificationProjector`]: the notification feed
//!
//! Presentation code reads accessors, issues commands, and re-renders on
//! [`idyll_events::ClientEvent`]s.

pub mod config;
pub mod context;
pub mod dashboard;
pub mod local;
pub mod preferences;
pub mod projector;
pub mod records;
pub mod router;
pub mod session;
pub mod sync;

pub use config::ClientConfig;
pub use context::AppContext;
