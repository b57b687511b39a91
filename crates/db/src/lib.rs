//! Remote store access for the Idyll client.
//!
//! - [`backend`] defines the three capability traits the client depends on
//!   (auth, tabular CRUD, change subscription) and the query vocabulary.
//! - [`rest`] implements them over the hosted auth + PostgREST HTTP API.
//! - [`memory`] implements them in-process for tests and offline demos.
//! - [`models`] and [`repositories`] give each table a typed surface.

pub mod backend;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod rest;
pub mod tables;

pub use backend::{
    AuthBackend, AuthEvent, AuthEventKind, AuthUser, Backend, BackendError, ChangeFeed, Filter,
    Order, Query, Session, SharedBackend, TableBackend,
};
pub use memory::MemoryBackend;
pub use rest::{RestBackend, RestConfig};
