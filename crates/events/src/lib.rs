//! In-process client event bus.
//!
//! - [`EventBus`] is the publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ClientEvent`] is the envelope presentation code listens to in order
//!   to know when to re-render from the stores' accessors.

pub mod bus;

pub use bus::{AlertReason, ClientEvent, EventBus};
