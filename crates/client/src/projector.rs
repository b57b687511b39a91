//! Notification projector.
//!
//! Turns store refreshes into a bounded feed of "new for you" entries.
//! Relevant items are the identity's assigned tasks and payouts, the
//! meetings it attends, and the notification rows addressed to it. An item
//! enters the feed when its key has not been observed before and it was
//! created after the identity's watermark.
//!
//! The first observation for an identity only records what already exists.
//! The watermark lives in the local store under
//! `lastNotificationCheck:<id>` and moves forward only on
//! [`NotificationProjector::mark_all_read`] and
//! [`NotificationProjector::clear_all`].

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};

use idyll_core::notifications::{self, NotificationCategory};
use idyll_core::types::{EntityId, Timestamp};
use idyll_db::models::user::User;
use idyll_events::{AlertReason, ClientEvent, EventBus};

use crate::local::{keys, LocalStore};
use crate::records::StoreSnapshot;

/// Entries kept in the feed, newest first.
pub const FEED_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub key: String,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub created_at: Timestamp,
    pub read: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectorOutcome {
    /// This observation established the baseline.
    pub baseline: bool,
    pub new_entries: usize,
    pub alerted: bool,
}

#[derive(Default)]
struct ProjectorState {
    user_id: Option<EntityId>,
    watermark: Option<Timestamp>,
    seen: HashSet<String>,
    feed: VecDeque<FeedEntry>,
}

pub struct NotificationProjector {
    local: Arc<LocalStore>,
    bus: Arc<EventBus>,
    state: Mutex<ProjectorState>,
}

impl NotificationProjector {
    pub fn new(local: Arc<LocalStore>, bus: Arc<EventBus>) -> Self {
        Self {
            local,
            bus,
            state: Mutex::new(ProjectorState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProjectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Diff `snapshot` against what `user` has already been shown.
    pub fn observe(&self, user: &User, snapshot: &StoreSnapshot) -> ProjectorOutcome {
        let candidates = relevant_items(user.id, snapshot);
        let mut state = self.lock();

        if state.user_id != Some(user.id) {
            *state = ProjectorState {
                user_id: Some(user.id),
                watermark: Some(self.load_watermark(user.id)),
                seen: candidates.into_iter().map(|c| c.key).collect(),
                feed: VecDeque::new(),
            };
            tracing::debug!(user_id = %user.id, seen = state.seen.len(), "Notification baseline recorded");
            return ProjectorOutcome {
                baseline: true,
                ..ProjectorOutcome::default()
            };
        }

        let watermark = state.watermark;
        let unseen: Vec<FeedEntry> = candidates
            .into_iter()
            .filter(|c| !state.seen.contains(&c.key))
            .collect();
        // Unseen items older than the watermark are remembered, never shown.
        state.seen.extend(unseen.iter().map(|c| c.key.clone()));
        let mut fresh: Vec<FeedEntry> = unseen
            .into_iter()
            .filter(|c| watermark.map_or(true, |w| c.created_at > w))
            .collect();
        fresh.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut outcome = ProjectorOutcome::default();
        for entry in fresh.iter().rev() {
            state.feed.push_front(entry.clone());
        }
        state.feed.truncate(FEED_LIMIT);
        outcome.new_entries = fresh.len();
        drop(state);

        for entry in &fresh {
            self.bus.publish(ClientEvent::FeedEntryAdded {
                key: entry.key.clone(),
                category: entry.category,
                title: entry.title.clone(),
            });
        }
        if !fresh.is_empty() {
            tracing::info!(user_id = %user.id, count = fresh.len(), "New notifications");
            if user.sound_enabled {
                self.bus.publish(ClientEvent::alert(AlertReason::NewItems { count: fresh.len() }));
                outcome.alerted = true;
            }
        }
        outcome
    }

    pub fn feed(&self) -> Vec<FeedEntry> {
        self.lock().feed.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().feed.iter().filter(|e| !e.read).count()
    }

    pub fn watermark(&self) -> Option<Timestamp> {
        self.lock().watermark
    }

    /// Returns `false` if no entry has that key.
    pub fn mark_read(&self, key: &str) -> bool {
        let mut state = self.lock();
        match state.feed.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        let mut state = self.lock();
        state.feed.iter_mut().for_each(|e| e.read = true);
        self.advance_watermark(&mut state);
    }

    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.feed.clear();
        self.advance_watermark(&mut state);
    }

    /// Forget the current identity, e.g. on sign-out.
    pub fn reset(&self) {
        *self.lock() = ProjectorState::default();
    }

    fn advance_watermark(&self, state: &mut ProjectorState) {
        let Some(user_id) = state.user_id else {
            return;
        };
        let now = Utc::now();
        state.watermark = Some(now);
        self.local.set(
            &keys::notification_watermark(user_id),
            now.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
    }

    /// The persisted watermark, or now (persisted) if there is none.
    fn load_watermark(&self, user_id: EntityId) -> Timestamp {
        let key = keys::notification_watermark(user_id);
        let stored = self
            .local
            .get(&key)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        match stored {
            Some(watermark) => watermark,
            None => {
                let now = Utc::now();
                self.local
                    .set(&key, now.to_rfc3339_opts(SecondsFormat::Micros, true));
                now
            }
        }
    }
}

fn relevant_items(user_id: EntityId, snapshot: &StoreSnapshot) -> Vec<FeedEntry> {
    let tasks = snapshot
        .task_records
        .iter()
        .filter(|t| t.assigned_to == user_id)
        .map(|t| {
            let text = notifications::task_assigned(&t.task_name);
            entry(format!("task:{}", t.id), text, t.created_at)
        });
    let payouts = snapshot
        .payout_records
        .iter()
        .filter(|p| p.assigned_to == user_id)
        .map(|p| {
            let text = notifications::payout_added(&p.project_name);
            entry(format!("payout:{}", p.id), text, p.created_at)
        });
    let meetings = snapshot
        .meetings
        .iter()
        .filter(|m| m.attendees.contains(&user_id))
        .map(|m| {
            let date = m.date.format("%Y-%m-%d").to_string();
            let text = notifications::meeting_invited(&m.name, &date, &m.time_label());
            entry(format!("meeting:{}", m.id), text, m.created_at)
        });
    let rows = snapshot
        .notifications
        .iter()
        .filter(|n| n.user_id == user_id)
        .map(|n| FeedEntry {
            key: format!("notification:{}", n.id),
            category: n.category,
            title: n.title.clone(),
            message: n.message.clone(),
            created_at: n.created_at,
            read: n.read,
        });
    tasks.chain(payouts).chain(meetings).chain(rows).collect()
}

fn entry(key: String, text: notifications::NotificationText, created_at: Timestamp) -> FeedEntry {
    FeedEntry {
        key,
        category: text.category,
        title: text.title,
        message: text.message,
        created_at,
        read: false,
    }
}
