//! Domain record store.
//!
//! Holds one role-scoped snapshot per collection. [`RecordStore::fetch_all`]
//! re-reads every collection concurrently and replaces each one atomically.
//! Every refresh takes a sequence number; a result older than the one
//! already applied to its collection is discarded, so refreshes that finish
//! out of order never roll state back. A collection whose fetch fails keeps
//! its previous rows.
//!
//! Commands live in [`mutations`].

pub mod mutations;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use idyll_core::access::{visibility_for, Actor, Visibility};
use idyll_core::types::EntityId;
use idyll_db::backend::{BackendError, SharedBackend, TableBackend};
use idyll_db::models::audit::AuditLog;
use idyll_db::models::meeting::Meeting;
use idyll_db::models::notification::Notification;
use idyll_db::models::payout_record::PayoutRecord;
use idyll_db::models::submission::UserSubmission;
use idyll_db::models::table::{RecordTable, TableKind};
use idyll_db::models::task_record::TaskRecord;
use idyll_db::models::user::User;
use idyll_db::repositories::{
    AuditRepo, MeetingRepo, NotificationRepo, PayoutRecordRepo, SubmissionRepo, TableRepo,
    TaskRecordRepo, UserRepo,
};
use idyll_events::{ClientEvent, EventBus};

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    TaskTables,
    TaskRecords,
    PayoutTables,
    PayoutRecords,
    Meetings,
    AuditLogs,
    Notifications,
    Submissions,
}

impl Collection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::TaskTables => "task_tables",
            Collection::TaskRecords => "task_records",
            Collection::PayoutTables => "payout_tables",
            Collection::PayoutRecords => "payout_records",
            Collection::Meetings => "meetings",
            Collection::AuditLogs => "audit_logs",
            Collection::Notifications => "notifications",
            Collection::Submissions => "user_submissions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot<T> {
    rows: Arc<Vec<T>>,
    applied_seq: u64,
}

impl<T> Slot<T> {
    fn empty(seq: u64) -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            applied_seq: seq,
        }
    }
}

struct Collections {
    users: Slot<User>,
    task_tables: Slot<RecordTable>,
    task_records: Slot<TaskRecord>,
    payout_tables: Slot<RecordTable>,
    payout_records: Slot<PayoutRecord>,
    meetings: Slot<Meeting>,
    audit_logs: Slot<AuditLog>,
    notifications: Slot<Notification>,
    submissions: Slot<UserSubmission>,
}

impl Collections {
    fn empty(seq: u64) -> Self {
        Self {
            users: Slot::empty(seq),
            task_tables: Slot::empty(seq),
            task_records: Slot::empty(seq),
            payout_tables: Slot::empty(seq),
            payout_records: Slot::empty(seq),
            meetings: Slot::empty(seq),
            audit_logs: Slot::empty(seq),
            notifications: Slot::empty(seq),
            submissions: Slot::empty(seq),
        }
    }
}

/// A consistent, cheaply cloned view of every collection.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub users: Arc<Vec<User>>,
    pub task_tables: Arc<Vec<RecordTable>>,
    pub task_records: Arc<Vec<TaskRecord>>,
    pub payout_tables: Arc<Vec<RecordTable>>,
    pub payout_records: Arc<Vec<PayoutRecord>>,
    pub meetings: Arc<Vec<Meeting>>,
    pub audit_logs: Arc<Vec<AuditLog>>,
    pub notifications: Arc<Vec<Notification>>,
    pub submissions: Arc<Vec<UserSubmission>>,
}

impl StoreSnapshot {
    pub fn tasks_in(&self, table_id: EntityId) -> impl Iterator<Item = &TaskRecord> {
        self.task_records.iter().filter(move |t| t.table_id == table_id)
    }

    pub fn payouts_in(&self, table_id: EntityId) -> impl Iterator<Item = &PayoutRecord> {
        self.payout_records
            .iter()
            .filter(move |p| p.table_id == table_id)
    }
}

/// Outcome of one [`RecordStore::fetch_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub sequence: u64,
    /// Collections replaced by this refresh.
    pub applied: Vec<Collection>,
    /// Collections whose result was older than what was already applied.
    pub discarded: Vec<Collection>,
    /// Collections whose fetch failed; they keep their previous rows.
    pub failed: Vec<Collection>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

type Fetched<T> = Result<Vec<T>, BackendError>;

fn apply<T>(
    slot: &mut Slot<T>,
    collection: Collection,
    result: Fetched<T>,
    seq: u64,
    report: &mut RefreshReport,
) {
    match result {
        Ok(rows) if seq > slot.applied_seq => {
            slot.rows = Arc::new(rows);
            slot.applied_seq = seq;
            report.applied.push(collection);
        }
        Ok(_) => report.discarded.push(collection),
        Err(e) => {
            tracing::warn!(collection = %collection, error = %e, "Keeping stale collection");
            report.failed.push(collection);
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

pub struct RecordStore {
    backend: SharedBackend,
    bus: Arc<EventBus>,
    audit_log_limit: usize,
    sequence: AtomicU64,
    state: RwLock<Collections>,
}

impl RecordStore {
    pub fn new(backend: SharedBackend, bus: Arc<EventBus>, audit_log_limit: usize) -> Self {
        Self {
            backend,
            bus,
            audit_log_limit,
            sequence: AtomicU64::new(0),
            state: RwLock::new(Collections::empty(0)),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            users: Arc::clone(&state.users.rows),
            task_tables: Arc::clone(&state.task_tables.rows),
            task_records: Arc::clone(&state.task_records.rows),
            payout_tables: Arc::clone(&state.payout_tables.rows),
            payout_records: Arc::clone(&state.payout_records.rows),
            meetings: Arc::clone(&state.meetings.rows),
            audit_logs: Arc::clone(&state.audit_logs.rows),
            notifications: Arc::clone(&state.notifications.rows),
            submissions: Arc::clone(&state.submissions.rows),
        }
    }

    /// Drop every collection. Refreshes still in flight are discarded.
    pub async fn clear(&self) {
        let seq = self.next_sequence();
        *self.state.write().await = Collections::empty(seq);
        tracing::debug!(sequence = seq, "Record store cleared");
    }

    /// Re-read every collection visible to `actor`.
    pub async fn fetch_all(&self, actor: Option<&Actor>) -> RefreshReport {
        let seq = self.next_sequence();
        let visibility = visibility_for(actor);
        let backend = &*self.backend;
        tracing::debug!(sequence = seq, visibility = ?visibility, "Refreshing records");

        let manager = actor.is_some_and(|a| a.is_approved() && a.is_manager());
        let recipient = actor.filter(|a| a.is_approved()).map(|a| a.id);

        let (users, task_records, payout_records, meetings, audit_logs, notifications, submissions) = tokio::join!(
            UserRepo::list(backend, visibility),
            TaskRecordRepo::list(backend, visibility),
            PayoutRecordRepo::list(backend, visibility),
            MeetingRepo::list(backend, visibility),
            AuditRepo::list_recent(backend, visibility, self.audit_log_limit),
            async {
                match recipient {
                    Some(id) => NotificationRepo::list_for_user(backend, id).await,
                    None => Ok(Vec::new()),
                }
            },
            async {
                if manager {
                    SubmissionRepo::list(backend).await
                } else {
                    Ok(Vec::new())
                }
            },
        );

        let task_table_ids = task_records
            .as_ref()
            .ok()
            .map(|rows| distinct(rows.iter().map(|t| t.table_id)));
        let payout_table_ids = payout_records
            .as_ref()
            .ok()
            .map(|rows| distinct(rows.iter().map(|p| p.table_id)));
        let (task_tables, payout_tables) = tokio::join!(
            fetch_tables(backend, TableKind::Task, visibility, task_table_ids),
            fetch_tables(backend, TableKind::Payout, visibility, payout_table_ids),
        );

        let mut report = RefreshReport {
            sequence: seq,
            ..RefreshReport::default()
        };
        {
            let mut state = self.state.write().await;
            apply(&mut state.users, Collection::Users, users, seq, &mut report);
            apply(&mut state.task_tables, Collection::TaskTables, task_tables, seq, &mut report);
            apply(&mut state.task_records, Collection::TaskRecords, task_records, seq, &mut report);
            apply(&mut state.payout_tables, Collection::PayoutTables, payout_tables, seq, &mut report);
            apply(&mut state.payout_records, Collection::PayoutRecords, payout_records, seq, &mut report);
            apply(&mut state.meetings, Collection::Meetings, meetings, seq, &mut report);
            apply(&mut state.audit_logs, Collection::AuditLogs, audit_logs, seq, &mut report);
            apply(&mut state.notifications, Collection::Notifications, notifications, seq, &mut report);
            apply(&mut state.submissions, Collection::Submissions, submissions, seq, &mut report);
        }

        tracing::info!(
            sequence = seq,
            applied = report.applied.len(),
            discarded = report.discarded.len(),
            failed = report.failed.len(),
            "Records refreshed"
        );
        self.bus.publish(ClientEvent::StoreRefreshed {
            sequence: seq,
            stale: report.failed.iter().map(|c| c.as_str().to_string()).collect(),
        });
        report
    }
}

fn distinct(ids: impl Iterator<Item = EntityId>) -> Vec<EntityId> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Editors see only the tables their records live in. `table_ids` is
/// `None` when the records themselves could not be fetched.
async fn fetch_tables<B>(
    backend: &B,
    kind: TableKind,
    visibility: Visibility,
    table_ids: Option<Vec<EntityId>>,
) -> Fetched<RecordTable>
where
    B: TableBackend + ?Sized,
{
    match visibility {
        Visibility::Everything => TableRepo::list(backend, kind).await,
        Visibility::Assigned(_) => match table_ids {
            Some(ids) => TableRepo::list_by_ids(backend, kind, &ids).await,
            None => Err(BackendError::Unavailable(format!(
                "{} unavailable",
                kind.record_table_name()
            ))),
        },
        Visibility::ProfileOnly(_) | Visibility::Nothing => Ok(Vec::new()),
    }
}
