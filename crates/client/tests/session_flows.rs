mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use idyll_client::local::{keys, LocalStore};
use idyll_client::router::Screen;
use idyll_client::{AppContext, ClientConfig};
use idyll_core::error::{AuthError, CoreError};
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_core::views::{HomeScreen, ViewId};
use idyll_db::backend::SharedBackend;
use idyll_db::models::table::TableKind;
use idyll_db::MemoryBackend;

use common::{client, client_with, editor, manager, new_task, PASSWORD};

#[tokio::test]
async fn pending_editor_is_held_until_approved() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;

    let ctx = client(&server);
    ctx.initialize().await;
    ctx.sign_up("nia@idyll.test", PASSWORD, "nia").await.unwrap();
    assert!(ctx.current_user().await.is_none(), "sign-up does not sign in");

    let nia = ctx.sign_in("nia", PASSWORD).await.unwrap();
    assert_eq!(nia.role, Role::Editor);
    assert_eq!(nia.status, ApprovalStatus::Pending);
    assert_eq!(ctx.router().current(), Some(ViewId::Pending));

    // Navigation is pinned while pending.
    ctx.set_view(ViewId::Payouts).await;
    assert_eq!(ctx.router().current(), Some(ViewId::Pending));
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.users.len(), 1, "only the own profile is visible");
    assert!(snapshot.notifications.is_empty());

    boss.refresh().await;
    boss.approve_user(nia.id).await.unwrap();

    ctx.refresh().await;
    assert_eq!(ctx.current_user().await.unwrap().status, ApprovalStatus::Approved);
    assert_eq!(ctx.screen().await, Screen::Home(HomeScreen::PersonalDashboard));
}

#[tokio::test]
async fn sign_in_accepts_username_or_email() {
    let server = MemoryBackend::new();
    let ctx = client(&server);
    ctx.sign_up("Kai@Idyll.test", PASSWORD, "kai").await.unwrap();

    let by_name = ctx.sign_in("kai", PASSWORD).await.unwrap();
    ctx.sign_out().await;
    let by_email = ctx.sign_in("kai@idyll.test", PASSWORD).await.unwrap();
    assert_eq!(by_name.id, by_email.id);
}

#[tokio::test]
async fn unknown_username_is_invalid_credentials() {
    let server = MemoryBackend::new();
    let ctx = client(&server);
    assert_matches!(
        ctx.sign_in("ghost", PASSWORD).await,
        Err(CoreError::Auth(AuthError::InvalidCredentials))
    );

    ctx.sign_up("lu@idyll.test", PASSWORD, "lu").await.unwrap();
    assert_matches!(
        ctx.sign_in("lu", "wrong-password").await,
        Err(CoreError::Auth(AuthError::InvalidCredentials))
    );
}

#[tokio::test]
async fn sign_up_rejects_weak_and_duplicate_accounts() {
    let server = MemoryBackend::new();
    let ctx = client(&server);
    assert_matches!(
        ctx.sign_up("a@idyll.test", "123", "a").await,
        Err(CoreError::Auth(AuthError::WeakPassword(_)))
    );

    ctx.sign_up("a@idyll.test", PASSWORD, "a").await.unwrap();
    assert_matches!(
        ctx.sign_up("a@idyll.test", PASSWORD, "someone-else").await,
        Err(CoreError::Auth(AuthError::DuplicateAccount))
    );
    assert_matches!(
        ctx.sign_up("b@idyll.test", PASSWORD, "a").await,
        Err(CoreError::Auth(AuthError::DuplicateAccount))
    );
}

#[tokio::test]
async fn slow_backend_degrades_to_signed_out() {
    let server = MemoryBackend::new();
    let config = ClientConfig {
        session_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let ctx = client_with(&server, config);
    server.set_latency(Duration::from_secs(1));

    assert_eq!(ctx.screen().await, Screen::Loading);
    assert!(ctx.initialize().await.is_none());
    assert!(!ctx.session().loading().await);
    assert_eq!(ctx.screen().await, Screen::Bare(ViewId::Landing));
}

#[tokio::test]
async fn session_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = MemoryBackend::new();

    let first = AppContext::new(
        ClientConfig::default(),
        Arc::new(server.new_client()) as SharedBackend,
        LocalStore::open(dir.path()).unwrap(),
        None,
    );
    first.sign_up("ro@idyll.test", PASSWORD, "ro").await.unwrap();
    let ro = first.sign_in("ro", PASSWORD).await.unwrap();
    assert!(first.local().get(keys::REFRESH_TOKEN).is_some());
    drop(first);

    let second = AppContext::new(
        ClientConfig::default(),
        Arc::new(server.new_client()) as SharedBackend,
        LocalStore::open(dir.path()).unwrap(),
        None,
    );
    let restored = second.initialize().await.expect("session restored from refresh token");
    assert_eq!(restored.id, ro.id);
    assert_eq!(second.router().current(), Some(ViewId::Pending));
}

#[tokio::test]
async fn sign_out_returns_to_landing_and_forgets_records() {
    let server = MemoryBackend::new();
    let (ctx, _) = manager(&server).await;
    ctx.set_view(ViewId::UserManagement).await;
    assert_eq!(ctx.router().current(), Some(ViewId::UserManagement));
    assert!(!ctx.snapshot().await.users.is_empty());

    ctx.sign_out().await;
    assert!(ctx.current_user().await.is_none());
    assert_eq!(ctx.router().current(), Some(ViewId::Landing));
    assert!(ctx.snapshot().await.users.is_empty());
    assert!(ctx.local().get(keys::REFRESH_TOKEN).is_none());
}

#[tokio::test]
async fn logins_and_logouts_are_audited() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (editor, _) = common::editor(&server, "jo").await;
    editor.sign_out().await;

    boss.refresh().await;
    let actions: Vec<String> = boss
        .snapshot()
        .await
        .audit_logs
        .iter()
        .map(|entry| format!("{}:{}", entry.username, entry.action))
        .collect();
    assert!(actions.contains(&"jo:LOGIN".to_string()));
    assert!(actions.contains(&"jo:LOGOUT".to_string()));
}

#[tokio::test]
async fn sign_out_during_a_refresh_stays_signed_out() {
    let server = MemoryBackend::new();
    let (ctx, _) = manager(&server).await;
    server.set_latency(Duration::from_millis(100));

    let refresh = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.sign_out().await;
    refresh.await.unwrap();

    assert!(ctx.current_user().await.is_none());
    assert!(!ctx.session().is_authenticated().await);
    assert!(ctx.snapshot().await.users.is_empty());
    assert!(ctx.local().get(keys::REFRESH_TOKEN).is_none());
    assert_eq!(ctx.router().current(), Some(ViewId::Landing));

    server.set_latency(Duration::ZERO);
    ctx.refresh().await;
    assert!(ctx.current_user().await.is_none(), "a later refresh does not revive it");
    assert!(ctx.snapshot().await.users.is_empty());
}

#[tokio::test]
async fn rejected_editor_loses_records_and_is_held_on_pending() {
    let server = MemoryBackend::new();
    let (boss, _) = manager(&server).await;
    let (ctx, rex) = editor(&server, "rex").await;
    let table = boss.create_table(TableKind::Task, "Reels").await.unwrap();
    boss.add_task(new_task(table.id, rex.id, "Cut")).await.unwrap();

    ctx.refresh().await;
    assert_eq!(ctx.snapshot().await.task_records.len(), 1);
    assert_eq!(ctx.router().current(), Some(ViewId::Home));

    boss.reject_user(rex.id).await.unwrap();
    ctx.refresh().await;

    assert_eq!(ctx.current_user().await.unwrap().status, ApprovalStatus::Rejected);
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.users.len(), 1, "only the own profile is visible");
    assert_eq!(snapshot.users[0].id, rex.id);
    assert!(snapshot.task_records.is_empty());
    assert!(snapshot.task_tables.is_empty());
    assert!(snapshot.notifications.is_empty());
    assert!(snapshot.meetings.is_empty());
    assert_eq!(ctx.router().current(), Some(ViewId::Pending));

    ctx.set_view(ViewId::Tasks).await;
    assert_eq!(ctx.router().current(), Some(ViewId::Pending));
}
