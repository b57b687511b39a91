//! Home-view statistics computed from a store snapshot.

use serde::Serialize;

use idyll_core::access::Actor;
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_core::types::EntityId;
use idyll_core::views::{home_view_for, HomeScreen};
use idyll_db::models::payout_record::{PayoutRecord, PayoutStatus};
use idyll_db::models::task_record::{TaskRecord, TaskStatus};
use idyll_db::models::user::User;

use crate::records::StoreSnapshot;

/// An editor's own numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersonalStats {
    pub total_tasks: usize,
    pub editing_tasks: usize,
    pub done_tasks: usize,
    pub meetings: usize,
    pub pending_payouts: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskBreakdown {
    pub total: usize,
    pub not_started: usize,
    pub editing: usize,
    pub cant_do: usize,
    pub done: usize,
}

impl TaskBreakdown {
    fn of<'a>(tasks: impl Iterator<Item = &'a TaskRecord>) -> Self {
        tasks.fold(Self::default(), |mut acc, task| {
            acc.total += 1;
            match task.status {
                TaskStatus::NotStarted => acc.not_started += 1,
                TaskStatus::Editing => acc.editing += 1,
                TaskStatus::CantDo => acc.cant_do += 1,
                TaskStatus::Done => acc.done += 1,
            }
            acc
        })
    }
}

/// The manager's system-wide (or single-editor) overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverviewStats {
    /// Approved users; `None` when narrowed to one editor.
    pub approved_users: Option<usize>,
    pub tasks: TaskBreakdown,
    pub meetings: usize,
    pub pending_payouts: usize,
    pub completed_payouts: usize,
}

fn payouts_with<'a>(payouts: impl Iterator<Item = &'a PayoutRecord>, status: PayoutStatus) -> usize {
    payouts.filter(|p| p.status == status).count()
}

pub fn personal_stats(snapshot: &StoreSnapshot, user_id: EntityId) -> PersonalStats {
    let tasks = TaskBreakdown::of(snapshot.task_records.iter().filter(|t| t.assigned_to == user_id));
    PersonalStats {
        total_tasks: tasks.total,
        editing_tasks: tasks.editing,
        done_tasks: tasks.done,
        meetings: snapshot
            .meetings
            .iter()
            .filter(|m| m.attendees.contains(&user_id))
            .count(),
        pending_payouts: payouts_with(
            snapshot.payout_records.iter().filter(|p| p.assigned_to == user_id),
            PayoutStatus::Pending,
        ),
    }
}

pub fn overview_stats(snapshot: &StoreSnapshot, selected: Option<EntityId>) -> OverviewStats {
    let Some(editor) = selected else {
        return OverviewStats {
            approved_users: Some(
                snapshot
                    .users
                    .iter()
                    .filter(|u| u.status == ApprovalStatus::Approved)
                    .count(),
            ),
            tasks: TaskBreakdown::of(snapshot.task_records.iter()),
            meetings: snapshot.meetings.len(),
            pending_payouts: payouts_with(snapshot.payout_records.iter(), PayoutStatus::Pending),
            completed_payouts: payouts_with(snapshot.payout_records.iter(), PayoutStatus::Done),
        };
    };

    let payouts = || snapshot.payout_records.iter().filter(move |p| p.assigned_to == editor);
    OverviewStats {
        approved_users: None,
        tasks: TaskBreakdown::of(snapshot.task_records.iter().filter(|t| t.assigned_to == editor)),
        meetings: snapshot
            .meetings
            .iter()
            .filter(|m| m.attendees.contains(&editor))
            .count(),
        pending_payouts: payouts_with(payouts(), PayoutStatus::Pending),
        completed_payouts: payouts_with(payouts(), PayoutStatus::Done),
    }
}

/// Statistics for the role-specific home view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum HomeStats {
    PersonalDashboard(PersonalStats),
    SystemOverview(OverviewStats),
}

/// `selected` narrows a manager's overview; editors ignore it.
pub fn home_stats(actor: &Actor, snapshot: &StoreSnapshot, selected: Option<EntityId>) -> HomeStats {
    match home_view_for(actor) {
        HomeScreen::PersonalDashboard => HomeStats::PersonalDashboard(personal_stats(snapshot, actor.id)),
        HomeScreen::SystemOverview => HomeStats::SystemOverview(overview_stats(snapshot, selected)),
    }
}

/// Editors a manager can narrow the overview to.
pub fn approved_editors(snapshot: &StoreSnapshot) -> Vec<&User> {
    snapshot
        .users
        .iter()
        .filter(|u| u.role == Role::Editor && u.status == ApprovalStatus::Approved)
        .collect()
}
