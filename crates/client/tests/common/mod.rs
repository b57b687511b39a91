#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use idyll_client::local::LocalStore;
use idyll_client::{AppContext, ClientConfig};
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_db::backend::SharedBackend;
use idyll_db::models::task_record::{NewTaskRecord, TaskStatus};
use idyll_db::models::user::{User, UserField};
use idyll_db::repositories::UserRepo;
use idyll_db::MemoryBackend;

pub const PASSWORD: &str = "correct-horse";

/// A client context with its own session on the shared `server`.
pub fn client(server: &MemoryBackend) -> AppContext {
    client_with(server, ClientConfig::default())
}

pub fn client_with(server: &MemoryBackend, config: ClientConfig) -> AppContext {
    let backend: SharedBackend = Arc::new(server.new_client());
    AppContext::new(config, backend, LocalStore::in_memory(), None)
}

/// Set role and status directly, the way `idyll-admin promote` does.
pub async fn provision(server: &MemoryBackend, username: &str, role: Role, status: ApprovalStatus) -> User {
    let user = UserRepo::find_by_username(server, username)
        .await
        .unwrap()
        .expect("profile exists after sign-up");
    UserRepo::update(server, user.id, &[UserField::Role(role), UserField::Status(status)])
        .await
        .unwrap()
        .unwrap()
}

/// Register `username`, provision it, and sign a fresh client in.
pub async fn signed_in(server: &MemoryBackend, username: &str, role: Role) -> (AppContext, User) {
    let ctx = client(server);
    ctx.sign_up(&format!("{username}@idyll.test"), PASSWORD, username)
        .await
        .unwrap();
    provision(server, username, role, ApprovalStatus::Approved).await;
    let user = ctx.sign_in(username, PASSWORD).await.unwrap();
    (ctx, user)
}

pub async fn manager(server: &MemoryBackend) -> (AppContext, User) {
    signed_in(server, "mira", Role::Manager).await
}

pub async fn editor(server: &MemoryBackend, username: &str) -> (AppContext, User) {
    signed_in(server, username, Role::Editor).await
}

pub fn new_task(table_id: Uuid, assignee: Uuid, name: &str) -> NewTaskRecord {
    NewTaskRecord {
        table_id,
        task_number: "T-1".into(),
        task_name: name.into(),
        deadline: NaiveDate::from_ymd_opt(2026, 11, 30),
        status: TaskStatus::NotStarted,
        raw_file_link: "https://drive.example/raw".into(),
        edited_file_link: String::new(),
        approval_from_idyll: false,
        assigned_to: assignee,
    }
}
