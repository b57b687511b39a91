//! Gated record commands.
//!
//! Every command follows the same pipeline: policy check, remote write, one
//! audit entry, then (for assignments) a notification row for the assignee
//! and an audible alert on the acting client. Remote failures are returned
//! as-is and never retried here.

use serde::Serialize;
use serde_json::{json, Map, Value};

use idyll_core::access::{can_mutate_record, can_perform, Operation};
use idyll_core::audit::{snapshot, AuditAction, ObjectType};
use idyll_core::error::{CoreError, CoreResult};
use idyll_core::notifications::{self, NotificationText};
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_core::types::EntityId;
use idyll_db::models::audit::{AuditLog, NewAuditLog};
use idyll_db::models::meeting::{Meeting, MeetingField, NewMeeting};
use idyll_db::models::notification::{NewNotification, Notification};
use idyll_db::models::payout_record::{NewPayoutRecord, PayoutRecord, PayoutRecordField};
use idyll_db::models::submission::{NewSubmission, SubmissionStatus, UserSubmission};
use idyll_db::models::table::{NewRecordTable, RecordTable, TableKind};
use idyll_db::models::task_record::{NewTaskRecord, TaskRecord, TaskRecordField};
use idyll_db::models::user::{User, UserField};
use idyll_db::models::{build_patch, scopes_of, FieldUpdate};
use idyll_db::repositories::{
    AuditRepo, MeetingRepo, NotificationRepo, PayoutRecordRepo, SubmissionRepo, TableRepo,
    TaskRecordRepo, UserRepo,
};
use idyll_events::{AlertReason, ClientEvent};
use validator::Validate;

use super::RecordStore;

fn require(allowed: bool, message: &str) -> CoreResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(CoreError::forbidden(message))
    }
}

fn require_manager(actor: &User, message: &str) -> CoreResult<()> {
    let actor = actor.actor();
    require(actor.is_approved() && actor.is_manager(), message)
}

fn require_fields<F>(fields: &[F]) -> CoreResult<()> {
    if fields.is_empty() {
        return Err(CoreError::validation("Nothing to update"));
    }
    Ok(())
}

fn require_text(value: &str, what: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{what} is required")));
    }
    Ok(())
}

fn require_amount(amount: f64) -> CoreResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(CoreError::validation("Amount must be a non-negative number"));
    }
    Ok(())
}

/// The touched columns of `before`, and the patch that replaces them.
fn changed_columns<T: Serialize, F: FieldUpdate>(before: &T, fields: &[F]) -> (Value, Value) {
    let before = serde_json::to_value(before).unwrap_or(Value::Null);
    let old: Map<String, Value> = fields
        .iter()
        .map(|f| {
            let column = f.column();
            (column.to_string(), before.get(column).cloned().unwrap_or(Value::Null))
        })
        .collect();
    (Value::Object(old), build_patch(fields))
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl RecordStore {
    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Append one audit entry. A failure here does not undo the command.
    async fn audit(
        &self,
        actor: &User,
        action: AuditAction,
        object_type: ObjectType,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Option<AuditLog> {
        let entry = NewAuditLog {
            user_id: actor.id,
            username: actor.display_name().to_string(),
            action,
            object_type,
            old_value: old_value.as_ref().map(snapshot),
            new_value: new_value.as_ref().map(snapshot),
        };
        match AuditRepo::append(&*self.backend, &entry).await {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(action = %action, object_type = %object_type, error = %e, "Failed to write audit entry");
                None
            }
        }
    }

    /// Notify `recipients` other than the actor; alert the actor once if
    /// anyone was notified.
    async fn notify(&self, actor: &User, recipients: &[EntityId], text: NotificationText) {
        let mut sent = 0usize;
        for &recipient in recipients.iter().filter(|id| **id != actor.id) {
            let input = NewNotification::new(recipient, text.clone());
            match NotificationRepo::create(&*self.backend, &input).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!(%recipient, error = %e, "Failed to create notification");
                }
            }
        }
        if sent > 0 {
            tracing::debug!(sent, category = %text.category.as_str(), "Assignment notifications sent");
            if actor.sound_enabled {
                self.bus.publish(ClientEvent::alert(AlertReason::AssignmentSent));
            }
        }
    }

    /// Record a sign-in or sign-out.
    pub async fn record_session_event(&self, actor: &User, action: AuditAction) {
        self.audit(actor, action, ObjectType::User, None, None).await;
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    pub async fn create_table(&self, actor: &User, kind: TableKind, name: &str) -> CoreResult<RecordTable> {
        require(
            can_perform(&actor.actor(), Operation::CreateTable),
            "Only managers can create tables",
        )?;
        require_text(name, "Table name")?;

        let input = NewRecordTable {
            name: name.trim().to_string(),
            created_by: actor.id,
        };
        let table = TableRepo::create(&*self.backend, kind, &input).await?;
        tracing::info!(table_id = %table.id, kind = ?kind, "Table created");
        self.audit(actor, AuditAction::Create, kind.object_type(), None, Some(json!({ "name": table.name })))
            .await;
        Ok(table)
    }

    pub async fn delete_table(&self, actor: &User, kind: TableKind, id: EntityId) -> CoreResult<()> {
        require(
            can_perform(&actor.actor(), Operation::DeleteTable),
            "Only managers can delete tables",
        )?;
        let table = TableRepo::find_by_id(&*self.backend, kind, id)
            .await?
            .ok_or_else(|| CoreError::not_found(kind.table_name(), id))?;
        TableRepo::delete(&*self.backend, kind, id).await?;
        tracing::info!(table_id = %id, kind = ?kind, "Table deleted");
        self.audit(actor, AuditAction::Delete, kind.object_type(), Some(json!({ "name": table.name })), None)
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Task records
    // -----------------------------------------------------------------------

    pub async fn add_task(&self, actor: &User, input: NewTaskRecord) -> CoreResult<TaskRecord> {
        require(
            can_perform(&actor.actor(), Operation::AddRecord),
            "Only managers can add tasks",
        )?;
        require_text(&input.task_name, "Task name")?;
        TableRepo::find_by_id(&*self.backend, TableKind::Task, input.table_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task_table", input.table_id))?;

        let task = TaskRecordRepo::create(&*self.backend, &input, actor.id).await?;
        tracing::info!(task_id = %task.id, assignee = %task.assigned_to, "Task added");
        self.audit(actor, AuditAction::Create, ObjectType::TaskRecord, None, Some(to_value(&input)))
            .await;
        self.notify(actor, &[task.assigned_to], notifications::task_assigned(&task.task_name))
            .await;
        Ok(task)
    }

    pub async fn update_task(
        &self,
        actor: &User,
        id: EntityId,
        fields: Vec<TaskRecordField>,
    ) -> CoreResult<TaskRecord> {
        require_fields(&fields)?;
        let current = TaskRecordRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("task_record", id))?;
        let op = Operation::update_of(scopes_of(&fields));
        require(
            can_mutate_record(&actor.actor(), &current, op),
            "You may only change the status and file links of your own tasks",
        )?;

        let updated = TaskRecordRepo::update(&*self.backend, id, &fields)
            .await?
            .ok_or_else(|| CoreError::not_found("task_record", id))?;
        tracing::info!(task_id = %id, fields = fields.len(), "Task updated");
        let (old, new) = changed_columns(&current, &fields);
        self.audit(actor, AuditAction::Update, ObjectType::TaskRecord, Some(old), Some(new))
            .await;
        if updated.assigned_to != current.assigned_to {
            self.notify(actor, &[updated.assigned_to], notifications::task_assigned(&updated.task_name))
                .await;
        }
        Ok(updated)
    }

    pub async fn delete_task(&self, actor: &User, id: EntityId) -> CoreResult<()> {
        require(
            can_perform(&actor.actor(), Operation::DeleteRecord),
            "Only managers can delete tasks",
        )?;
        let current = TaskRecordRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("task_record", id))?;
        TaskRecordRepo::delete(&*self.backend, id).await?;
        tracing::info!(task_id = %id, "Task deleted");
        self.audit(actor, AuditAction::Delete, ObjectType::TaskRecord, Some(to_value(&current)), None)
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Payout records
    // -----------------------------------------------------------------------

    pub async fn add_payout(&self, actor: &User, input: NewPayoutRecord) -> CoreResult<PayoutRecord> {
        require(
            can_perform(&actor.actor(), Operation::AddRecord),
            "Only managers can add payouts",
        )?;
        require_text(&input.project_name, "Project name")?;
        require_amount(input.amount)?;
        TableRepo::find_by_id(&*self.backend, TableKind::Payout, input.table_id)
            .await?
            .ok_or_else(|| CoreError::not_found("payout_table", input.table_id))?;

        let payout = PayoutRecordRepo::create(&*self.backend, &input, actor.id).await?;
        tracing::info!(payout_id = %payout.id, assignee = %payout.assigned_to, "Payout added");
        self.audit(actor, AuditAction::Create, ObjectType::PayoutRecord, None, Some(to_value(&input)))
            .await;
        self.notify(actor, &[payout.assigned_to], notifications::payout_added(&payout.project_name))
            .await;
        Ok(payout)
    }

    pub async fn update_payout(
        &self,
        actor: &User,
        id: EntityId,
        fields: Vec<PayoutRecordField>,
    ) -> CoreResult<PayoutRecord> {
        require_fields(&fields)?;
        for field in &fields {
            if let PayoutRecordField::Amount(amount) = field {
                require_amount(*amount)?;
            }
        }
        let current = PayoutRecordRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("payout_record", id))?;
        let op = Operation::update_of(scopes_of(&fields));
        require(
            can_mutate_record(&actor.actor(), &current, op),
            "Only managers can change payouts",
        )?;

        let updated = PayoutRecordRepo::update(&*self.backend, id, &fields)
            .await?
            .ok_or_else(|| CoreError::not_found("payout_record", id))?;
        tracing::info!(payout_id = %id, fields = fields.len(), "Payout updated");
        let (old, new) = changed_columns(&current, &fields);
        self.audit(actor, AuditAction::Update, ObjectType::PayoutRecord, Some(old), Some(new))
            .await;
        if updated.assigned_to != current.assigned_to {
            self.notify(actor, &[updated.assigned_to], notifications::payout_added(&updated.project_name))
                .await;
        }
        Ok(updated)
    }

    pub async fn delete_payout(&self, actor: &User, id: EntityId) -> CoreResult<()> {
        require(
            can_perform(&actor.actor(), Operation::DeleteRecord),
            "Only managers can delete payouts",
        )?;
        let current = PayoutRecordRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("payout_record", id))?;
        PayoutRecordRepo::delete(&*self.backend, id).await?;
        tracing::info!(payout_id = %id, "Payout deleted");
        self.audit(actor, AuditAction::Delete, ObjectType::PayoutRecord, Some(to_value(&current)), None)
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Meetings
    // -----------------------------------------------------------------------

    pub async fn add_meeting(&self, actor: &User, input: NewMeeting) -> CoreResult<Meeting> {
        require(
            can_perform(&actor.actor(), Operation::AddRecord),
            "Only managers can schedule meetings",
        )?;
        require_text(&input.name, "Meeting name")?;

        let meeting = MeetingRepo::create(&*self.backend, &input, actor.id).await?;
        tracing::info!(meeting_id = %meeting.id, attendees = meeting.attendees.len(), "Meeting scheduled");
        self.audit(actor, AuditAction::Create, ObjectType::Meeting, None, Some(to_value(&input)))
            .await;
        let text = invitation(&meeting);
        self.notify(actor, &meeting.attendees, text).await;
        Ok(meeting)
    }

    pub async fn update_meeting(
        &self,
        actor: &User,
        id: EntityId,
        fields: Vec<MeetingField>,
    ) -> CoreResult<Meeting> {
        require_fields(&fields)?;
        let current = MeetingRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("meeting", id))?;
        let op = Operation::update_of(scopes_of(&fields));
        require(
            can_mutate_record(&actor.actor(), &current, op),
            "Only managers can change meetings",
        )?;

        let updated = MeetingRepo::update(&*self.backend, id, &fields)
            .await?
            .ok_or_else(|| CoreError::not_found("meeting", id))?;
        tracing::info!(meeting_id = %id, fields = fields.len(), "Meeting updated");
        let (old, new) = changed_columns(&current, &fields);
        self.audit(actor, AuditAction::Update, ObjectType::Meeting, Some(old), Some(new))
            .await;

        let added: Vec<EntityId> = updated
            .attendees
            .iter()
            .copied()
            .filter(|id| !current.attendees.contains(id))
            .collect();
        if !added.is_empty() {
            self.notify(actor, &added, invitation(&updated)).await;
        }
        Ok(updated)
    }

    pub async fn delete_meeting(&self, actor: &User, id: EntityId) -> CoreResult<()> {
        require(
            can_perform(&actor.actor(), Operation::DeleteRecord),
            "Only managers can delete meetings",
        )?;
        let current = MeetingRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("meeting", id))?;
        MeetingRepo::delete(&*self.backend, id).await?;
        tracing::info!(meeting_id = %id, "Meeting deleted");
        self.audit(actor, AuditAction::Delete, ObjectType::Meeting, Some(to_value(&current)), None)
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Managers may change anything; everyone may change their own
    /// username, email, avatar and preferences.
    pub async fn update_user(&self, actor: &User, id: EntityId, fields: Vec<UserField>) -> CoreResult<User> {
        require_fields(&fields)?;
        let current = UserRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;
        let op = Operation::update_of(scopes_of(&fields));
        require(
            can_mutate_record(&actor.actor(), &current, op),
            "Only managers can change other users",
        )?;

        let updated = UserRepo::update(&*self.backend, id, &fields)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;
        tracing::info!(user_id = %id, fields = fields.len(), "User updated");
        let (old, new) = changed_columns(&current, &fields);
        self.audit(actor, AuditAction::Update, ObjectType::User, Some(old), Some(new))
            .await;
        Ok(updated)
    }

    pub async fn approve_user(&self, actor: &User, id: EntityId) -> CoreResult<User> {
        self.update_user(actor, id, vec![UserField::Status(ApprovalStatus::Approved)])
            .await
    }

    pub async fn reject_user(&self, actor: &User, id: EntityId) -> CoreResult<User> {
        self.update_user(actor, id, vec![UserField::Status(ApprovalStatus::Rejected)])
            .await
    }

    pub async fn set_role(&self, actor: &User, id: EntityId, role: Role) -> CoreResult<User> {
        self.update_user(actor, id, vec![UserField::Role(role)]).await
    }

    /// Remove a profile. Records assigned to it are left in place.
    pub async fn delete_user(&self, actor: &User, id: EntityId) -> CoreResult<()> {
        require(
            can_perform(&actor.actor(), Operation::DeleteRecord),
            "Only managers can delete users",
        )?;
        if id == actor.id {
            return Err(CoreError::forbidden("You cannot delete your own account"));
        }
        let current = UserRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;
        UserRepo::delete(&*self.backend, id).await?;
        tracing::info!(user_id = %id, "User deleted");
        let old = json!({ "username": current.username, "email": current.email });
        self.audit(actor, AuditAction::Delete, ObjectType::User, Some(old), None)
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub async fn mark_notification_read(&self, actor: &User, id: EntityId) -> CoreResult<Notification> {
        let current = NotificationRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("notification", id))?;
        require(current.user_id == actor.id, "Not your notification")?;
        if current.read {
            return Ok(current);
        }
        NotificationRepo::mark_read(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("notification", id))
    }

    pub async fn mark_all_notifications_read(&self, actor: &User) -> CoreResult<usize> {
        let marked = NotificationRepo::mark_all_read(&*self.backend, actor.id).await?;
        tracing::debug!(user_id = %actor.id, marked, "Notifications marked read");
        Ok(marked)
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Empty the audit log, leaving one CLEAR entry behind.
    pub async fn clear_audit_log(&self, actor: &User) -> CoreResult<usize> {
        require_manager(actor, "Only managers can clear the audit log")?;
        let removed = AuditRepo::clear(&*self.backend).await?;
        tracing::info!(removed, "Audit log cleared");
        self.audit(actor, AuditAction::Clear, ObjectType::AuditLog, Some(json!({ "entries": removed })), None)
            .await;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Public application form; needs no session.
    pub async fn submit_application(&self, input: NewSubmission) -> CoreResult<UserSubmission> {
        let input = NewSubmission {
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            message: input.message,
        };
        input
            .validate()
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let submission = SubmissionRepo::create(&*self.backend, &input).await?;
        tracing::info!(submission_id = %submission.id, "Application submitted");
        Ok(submission)
    }

    pub async fn update_submission_status(
        &self,
        actor: &User,
        id: EntityId,
        status: SubmissionStatus,
    ) -> CoreResult<UserSubmission> {
        require_manager(actor, "Only managers can review applications")?;
        let current = SubmissionRepo::find_by_id(&*self.backend, id)
            .await?
            .ok_or_else(|| CoreError::not_found("user_submission", id))?;
        let updated = SubmissionRepo::set_status(&*self.backend, id, status)
            .await?
            .ok_or_else(|| CoreError::not_found("user_submission", id))?;
        tracing::info!(submission_id = %id, status = status.as_str(), "Application reviewed");
        self.audit(
            actor,
            AuditAction::Update,
            ObjectType::UserSubmission,
            Some(json!({ "status": current.status.as_str() })),
            Some(json!({ "status": status.as_str() })),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_submission(&self, actor: &User, id: EntityId) -> CoreResult<()> {
        require_manager(actor, "Only managers can delete applications")?;
        if !SubmissionRepo::delete(&*self.backend, id).await? {
            return Err(CoreError::not_found("user_submission", id));
        }
        self.audit(actor, AuditAction::Delete, ObjectType::UserSubmission, Some(json!({ "id": id })), None)
            .await;
        Ok(())
    }
}

fn invitation(meeting: &Meeting) -> NotificationText {
    notifications::meeting_invited(
        &meeting.name,
        &meeting.date.format("%Y-%m-%d").to_string(),
        &meeting.time_label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_db::models::task_record::TaskStatus;

    #[test]
    fn changed_columns_pick_only_touched_fields() {
        let before = json!({ "status": "Editing", "task_name": "Cut", "raw_file_link": "" });
        let (old, new) = changed_columns(
            &before,
            &[TaskRecordField::Status(TaskStatus::Done)],
        );
        assert_eq!(old, json!({ "status": "Editing" }));
        assert_eq!(new, json!({ "status": "Done" }));
    }

    #[test]
    fn empty_updates_are_rejected() {
        let fields: Vec<TaskRecordField> = Vec::new();
        assert!(matches!(require_fields(&fields), Err(CoreError::Validation(_))));
    }
}
