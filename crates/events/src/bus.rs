//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` by every store in the client
//! context. Stores publish after they have committed their own state, so a
//! subscriber reading an accessor on receipt always sees the new state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use idyll_core::notifications::NotificationCategory;
use idyll_core::types::EntityId;
use idyll_core::views::ViewId;

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Why an audible alert was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertReason {
    /// The local identity just assigned work to someone else.
    AssignmentSent,
    /// A refresh surfaced `count` items not seen before.
    NewItems { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The signed-in identity changed (sign-in, sign-out, profile reload).
    SessionChanged { user_id: Option<EntityId> },

    /// One record store refresh completed.
    StoreRefreshed {
        sequence: u64,
        stale: Vec<String>,
    },

    /// The effective view changed.
    ViewChanged { from: Option<ViewId>, to: ViewId },

    /// A new entry was added to the notification feed.
    FeedEntryAdded {
        key: String,
        category: NotificationCategory,
        title: String,
    },

    /// Play the notification sound.
    Alert {
        reason: AlertReason,
        at: DateTime<Utc>,
    },
}

impl ClientEvent {
    pub fn alert(reason: AlertReason) -> Self {
        ClientEvent::Alert {
            reason,
            at: Utc::now(),
        }
    }

    /// Short dotted name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SessionChanged { .. } => "session.changed",
            ClientEvent::StoreRefreshed { .. } => "store.refreshed",
            ClientEvent::ViewChanged { .. } => "view.changed",
            ClientEvent::FeedEntryAdded { .. } => "feed.entry_added",
            ClientEvent::Alert { .. } => "alert",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Room for a full refresh burst (one `FeedEntryAdded` per new row plus
/// the session, store and view events) before a slow listener lags.
const DEFAULT_CAPACITY: usize = 256;

/// Carries [`ClientEvent`]s from the session store, record store, router
/// and notification projector to whoever renders them.
///
/// ```rust
/// use idyll_events::bus::{ClientEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ClientEvent::SessionChanged { user_id: None });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// A listener that falls more than `capacity` events behind skips
    /// ahead and sees `RecvError::Lagged`; the stores themselves are
    /// unaffected and can be re-read through their accessors.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Events published while nobody listens are not replayed later.
    pub fn publish(&self, event: ClientEvent) {
        match self.sender.send(event) {
            Ok(listeners) => tracing::trace!(listeners, "Event published"),
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(event = event.name(), "No listeners for event");
            }
        }
    }

    /// Listen for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(ClientEvent::ViewChanged {
            from: Some(ViewId::Login),
            to: ViewId::Home,
        });

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(
            received,
            ClientEvent::ViewChanged {
                from: Some(ViewId::Login),
                to: ViewId::Home
            }
        );
        assert_eq!(received.name(), "view.changed");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(ClientEvent::alert(AlertReason::NewItems { count: 2 }));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1, e2);
        assert!(matches!(
            e1,
            ClientEvent::Alert {
                reason: AlertReason::NewItems { count: 2 },
                ..
            }
        ));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(ClientEvent::SessionChanged { user_id: None });
    }

    #[test]
    fn late_listener_misses_earlier_events() {
        let bus = EventBus::default();
        bus.publish(ClientEvent::SessionChanged { user_id: None });

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.publish(ClientEvent::alert(AlertReason::AssignmentSent));
        assert_eq!(rx.try_recv().unwrap().name(), "alert");
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = ClientEvent::StoreRefreshed {
            sequence: 3,
            stale: vec!["meetings".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "store_refreshed");
        assert_eq!(json["stale"][0], "meetings");
    }
}
