mod common;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};

use idyll_client::dashboard::HomeStats;
use idyll_core::error::{AuthError, CoreError};
use idyll_core::notifications::NotificationCategory;
use idyll_core::roles::Role;
use idyll_db::models::meeting::{MeetingField, NewMeeting};
use idyll_db::models::payout_record::{NewPayoutRecord, PayoutRecordField, PayoutStatus};
use idyll_db::models::submission::{NewSubmission, SubmissionStatus};
use idyll_db::models::table::TableKind;
use idyll_db::models::task_record::{TaskRecordField, TaskStatus};
use idyll_db::models::user::UserField;
use idyll_db::{tables, MemoryBackend};
use idyll_events::{AlertReason, ClientEvent};

use common::{client, editor, manager, new_task};

fn new_payout(table_id: uuid::Uuid, assignee: uuid::Uuid, project: &str, amount: f64) -> NewPayoutRecord {
    NewPayoutRecord {
        table_id,
        project_name: project.into(),
        project_link: "https://drive.example/project".into(),
        amount,
        status: PayoutStatus::Pending,
        assigned_to: assignee,
    }
}

#[tokio::test]
async fn assigned_task_reaches_only_its_editor() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;
    let (kim_ctx, kim) = editor(&server, "kim").await;

    let october = boss.create_table(TableKind::Task, "October").await.unwrap();
    let hidden = boss.create_table(TableKind::Task, "Hidden").await.unwrap();
    boss.add_task(new_task(hidden.id, kim.id, "Kim's cut")).await.unwrap();

    let mut events = boss.subscribe_events();
    let task = boss.add_task(new_task(october.id, jo.id, "Trailer")).await.unwrap();
    assert_eq!(task.created_by, Some(boss.current_user().await.unwrap().id));

    let mut alerted = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Alert { reason, .. } = event {
            assert_eq!(reason, AlertReason::AssignmentSent);
            alerted = true;
        }
    }
    assert!(alerted, "the assigning manager hears the assignment sound");

    jo_ctx.refresh().await;
    let seen = jo_ctx.snapshot().await;
    assert_eq!(seen.task_records.len(), 1);
    assert_eq!(seen.task_records[0].id, task.id);
    assert_eq!(seen.task_tables.len(), 1);
    assert_eq!(seen.task_tables[0].id, october.id);
    assert_eq!(seen.notifications.len(), 1);
    assert_eq!(seen.notifications[0].category, NotificationCategory::Task);
    assert!(seen.notifications[0].message.contains("Trailer"));

    kim_ctx.refresh().await;
    assert_eq!(kim_ctx.snapshot().await.task_records.len(), 1);

    boss.refresh().await;
    let audit = boss.snapshot().await.audit_logs;
    assert!(audit
        .iter()
        .any(|entry| entry.action == "CREATE" && entry.object_type == "TASK_RECORD"));
}

#[tokio::test]
async fn editors_cannot_structure_or_reassign() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;
    let (_, kim) = editor(&server, "kim").await;

    let table = boss.create_table(TableKind::Task, "Reels").await.unwrap();
    let own = boss.add_task(new_task(table.id, jo.id, "Own")).await.unwrap();
    let other = boss.add_task(new_task(table.id, kim.id, "Other")).await.unwrap();

    assert_matches!(
        jo_ctx.create_table(TableKind::Task, "Mine").await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        jo_ctx.add_task(new_task(table.id, jo.id, "Self-assigned")).await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(jo_ctx.delete_task(own.id).await, Err(CoreError::Forbidden(_)));
    assert_matches!(
        jo_ctx
            .update_task(own.id, vec![TaskRecordField::AssignedTo(kim.id)])
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        jo_ctx
            .update_task(other.id, vec![TaskRecordField::Status(TaskStatus::Done)])
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(jo_ctx.clear_audit_log().await, Err(CoreError::Forbidden(_)));
    assert_matches!(jo_ctx.approve_user(kim.id).await, Err(CoreError::Forbidden(_)));
    assert_matches!(
        jo_ctx.update_user(jo.id, vec![UserField::Role(Role::Manager)]).await,
        Err(CoreError::Forbidden(_))
    );
}

#[tokio::test]
async fn editor_updates_status_and_links_of_own_task() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;
    let table = boss.create_table(TableKind::Task, "Reels").await.unwrap();
    let task = boss.add_task(new_task(table.id, jo.id, "Teaser")).await.unwrap();

    let updated = jo_ctx
        .update_task(
            task.id,
            vec![
                TaskRecordField::Status(TaskStatus::Editing),
                TaskRecordField::EditedFileLink("https://drive.example/v1".into()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Editing);
    assert_eq!(updated.edited_file_link, "https://drive.example/v1");
    assert_eq!(updated.task_name, "Teaser");

    jo_ctx.refresh().await;
    let Some(HomeStats::PersonalDashboard(stats)) = jo_ctx.home_stats(None).await else {
        panic!("editors get the personal dashboard");
    };
    assert_eq!(stats.total_tasks, 1);
    assert_eq!(stats.editing_tasks, 1);

    boss.refresh().await;
    let audit = boss.snapshot().await.audit_logs;
    let entry = audit
        .iter()
        .find(|entry| entry.action == "UPDATE" && entry.username == "jo")
        .expect("update is audited");
    assert!(entry.old_value.as_deref().unwrap_or_default().contains("Not Started"));
}

#[tokio::test]
async fn commands_need_a_session() {
    let server = MemoryBackend::new();
    let ctx = client(&server);
    ctx.initialize().await;
    assert_matches!(
        ctx.create_table(TableKind::Payout, "Q4").await,
        Err(CoreError::Auth(AuthError::NotSignedIn))
    );
}

#[tokio::test]
async fn failed_refresh_keeps_previous_rows() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    boss.create_table(TableKind::Payout, "Q4").await.unwrap();
    let report = boss.refresh().await;
    assert!(report.is_complete());
    assert_eq!(boss.snapshot().await.payout_tables.len(), 1);

    server.set_available(false);
    let report = boss.refresh().await;
    assert!(!report.is_complete());
    assert!(report.applied.is_empty());
    assert_eq!(boss.snapshot().await.payout_tables.len(), 1);
    assert!(boss.current_user().await.is_some(), "identity survives an outage");

    server.set_available(true);
    assert!(boss.refresh().await.is_complete());
}

#[tokio::test]
async fn deleting_a_table_removes_its_records() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (_, jo) = editor(&server, "jo").await;
    let table = boss.create_table(TableKind::Task, "Scrap").await.unwrap();
    boss.add_task(new_task(table.id, jo.id, "One")).await.unwrap();
    boss.add_task(new_task(table.id, jo.id, "Two")).await.unwrap();
    assert_eq!(server.row_count(tables::TASK_RECORDS).await, 2);

    boss.delete_table(TableKind::Task, table.id).await.unwrap();
    assert_eq!(server.row_count(tables::TASK_RECORDS).await, 0);
    assert_eq!(server.row_count(tables::TASK_TABLES).await, 0);
}

#[tokio::test]
async fn managers_cannot_delete_themselves() {
    let server = MemoryBackend::new();
    let (boss, me) = manager(&server).await;
    assert_matches!(boss.delete_user(me.id).await, Err(CoreError::Forbidden(_)));

    let (_, jo) = editor(&server, "jo").await;
    boss.delete_user(jo.id).await.unwrap();
    boss.refresh().await;
    assert!(boss.snapshot().await.users.iter().all(|u| u.id != jo.id));
}

#[tokio::test]
async fn meeting_invites_everyone_but_the_organizer() {
    let server = MemoryBackend::new();
    let (boss, me) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;
    let (kim_ctx, kim) = editor(&server, "kim").await;

    let meeting = boss
        .add_meeting(NewMeeting {
            name: "Kickoff".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            link: "https://meet.example/kickoff".into(),
            attendees: vec![me.id, jo.id],
        })
        .await
        .unwrap();
    assert_eq!(server.row_count(tables::NOTIFICATIONS).await, 1);

    boss.update_meeting(
        meeting.id,
        vec![MeetingField::Attendees(vec![me.id, jo.id, kim.id])],
    )
    .await
    .unwrap();
    assert_eq!(server.row_count(tables::NOTIFICATIONS).await, 2, "only the new attendee is invited");

    jo_ctx.refresh().await;
    kim_ctx.refresh().await;
    assert_eq!(jo_ctx.snapshot().await.meetings.len(), 1);
    let kim_view = kim_ctx.snapshot().await;
    assert_eq!(kim_view.notifications.len(), 1);
    assert_eq!(kim_view.notifications[0].category, NotificationCategory::Meeting);

    assert_eq!(jo_ctx.mark_all_notifications_read().await.unwrap(), 1);
    jo_ctx.refresh().await;
    assert!(jo_ctx.snapshot().await.notifications.iter().all(|n| n.read));
}

#[tokio::test]
async fn applications_are_public_and_reviewed_by_managers() {
    let server = MemoryBackend::new();
    let visitor = client(&server);
    visitor.initialize().await;
    let submission = visitor
        .submit_application(NewSubmission {
            name: "  Ana ".into(),
            email: "ana@studio.test".into(),
            message: "I cut trailers.".into(),
        })
        .await
        .unwrap();
    assert_eq!(submission.name, "Ana");
    assert_eq!(submission.status, SubmissionStatus::Pending);

    assert_matches!(
        visitor
            .submit_application(NewSubmission {
                name: "Bo".into(),
                email: "not-an-email".into(),
                message: String::new(),
            })
            .await,
        Err(CoreError::Validation(_))
    );

    let (jo_ctx, _) = editor(&server, "jo").await;
    assert!(jo_ctx.snapshot().await.submissions.is_empty());

    let (boss, _) = manager(&server).await;
    assert_eq!(boss.snapshot().await.submissions.len(), 1);
    let reviewed = boss
        .update_submission_status(submission.id, SubmissionStatus::Contacted)
        .await
        .unwrap();
    assert_eq!(reviewed.status, SubmissionStatus::Contacted);
    boss.refresh().await;
    let audit = boss.snapshot().await.audit_logs;
    let entry = audit
        .iter()
        .find(|entry| entry.object_type == "USER_SUBMISSION" && entry.action == "UPDATE")
        .expect("review is audited");
    assert!(entry.old_value.as_deref().unwrap_or_default().contains("PENDING"));
    assert!(entry.new_value.as_deref().unwrap_or_default().contains("CONTACTED"));
    boss.delete_submission(submission.id).await.unwrap();
    assert_matches!(
        boss.delete_submission(submission.id).await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn clearing_the_audit_log_leaves_one_entry() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    boss.create_table(TableKind::Task, "A").await.unwrap();
    assert!(boss.clear_audit_log().await.unwrap() >= 2);

    boss.refresh().await;
    let audit = boss.snapshot().await.audit_logs;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "CLEAR");
}

#[tokio::test]
async fn payouts_are_managed_by_managers_and_seen_by_their_assignee() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;
    let (_, kim) = editor(&server, "kim").await;

    let q4 = boss.create_table(TableKind::Payout, "Q4").await.unwrap();
    let other = boss.create_table(TableKind::Payout, "Kim only").await.unwrap();

    assert_matches!(
        boss.add_payout(new_payout(q4.id, jo.id, "Trailer", -5.0)).await,
        Err(CoreError::Validation(_))
    );
    assert_matches!(
        boss.add_payout(new_payout(q4.id, jo.id, "Trailer", f64::NAN)).await,
        Err(CoreError::Validation(_))
    );
    assert_eq!(server.row_count(tables::PAYOUT_RECORDS).await, 0);

    let mine = boss.add_payout(new_payout(q4.id, jo.id, "Trailer", 120.0)).await.unwrap();
    let theirs = boss.add_payout(new_payout(other.id, kim.id, "Teaser", 80.0)).await.unwrap();
    assert_eq!(mine.created_by, Some(boss.current_user().await.unwrap().id));

    jo_ctx.refresh().await;
    let seen = jo_ctx.snapshot().await;
    assert_eq!(seen.payout_records.len(), 1);
    assert_eq!(seen.payout_records[0].id, mine.id);
    assert_eq!(seen.payout_tables.len(), 1);
    assert_eq!(seen.payout_tables[0].id, q4.id);
    assert_eq!(seen.notifications.len(), 1);
    assert_eq!(seen.notifications[0].category, NotificationCategory::Payout);
    assert!(seen.notifications[0].message.contains("Trailer"));

    assert_matches!(
        jo_ctx
            .update_payout(mine.id, vec![PayoutRecordField::Status(PayoutStatus::Done)])
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        jo_ctx.add_payout(new_payout(q4.id, jo.id, "Bonus", 10.0)).await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(jo_ctx.delete_payout(mine.id).await, Err(CoreError::Forbidden(_)));

    assert_matches!(
        boss.update_payout(mine.id, vec![PayoutRecordField::Amount(f64::INFINITY)]).await,
        Err(CoreError::Validation(_))
    );
    let paid = boss
        .update_payout(
            mine.id,
            vec![
                PayoutRecordField::Amount(150.0),
                PayoutRecordField::Status(PayoutStatus::Done),
            ],
        )
        .await
        .unwrap();
    assert_eq!(paid.amount, 150.0);
    assert_eq!(paid.status, PayoutStatus::Done);

    boss.delete_payout(theirs.id).await.unwrap();
    assert_matches!(boss.delete_payout(theirs.id).await, Err(CoreError::NotFound { .. }));
    assert_eq!(server.row_count(tables::PAYOUT_RECORDS).await, 1);

    boss.refresh().await;
    let audit = boss.snapshot().await.audit_logs;
    let update = audit
        .iter()
        .find(|entry| entry.object_type == "PAYOUT_RECORD" && entry.action == "UPDATE")
        .expect("payout update is audited");
    assert!(update.old_value.as_deref().unwrap_or_default().contains("120"));
    assert!(audit
        .iter()
        .any(|entry| entry.object_type == "PAYOUT_RECORD" && entry.action == "DELETE"));
}

#[tokio::test]
async fn attendees_cannot_change_meetings() {
    let server = MemoryBackend::new();
    let (boss, me) = manager(&server).await;
    let (jo_ctx, jo) = editor(&server, "jo").await;

    let meeting = boss
        .add_meeting(NewMeeting {
            name: "Review".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 9).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            link: "https://meet.example/review".into(),
            attendees: vec![me.id, jo.id],
        })
        .await
        .unwrap();

    jo_ctx.refresh().await;
    assert_eq!(jo_ctx.snapshot().await.meetings.len(), 1);
    assert_matches!(
        jo_ctx
            .update_meeting(meeting.id, vec![MeetingField::Name("Moved".into())])
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        jo_ctx
            .update_meeting(meeting.id, vec![MeetingField::Attendees(vec![jo.id])])
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(jo_ctx.delete_meeting(meeting.id).await, Err(CoreError::Forbidden(_)));

    boss.refresh().await;
    assert_eq!(boss.snapshot().await.meetings[0].name, "Review");
}
