//! Domain vocabulary and pure policy for the Idyll production client.
//!
//! Nothing in this crate performs I/O. The record store, session store and
//! view router in `idyll-client` call into [`access`] and [`views`] to decide
//! what an identity may see and do.

pub mod access;
pub mod audit;
pub mod change;
pub mod error;
pub mod notifications;
pub mod preferences;
pub mod roles;
pub mod types;
pub mod views;
