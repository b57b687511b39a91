//! Repository for the `users` table.

use idyll_core::access::Visibility;
use idyll_core::roles::ApprovalStatus;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id, update_by_id};
use crate::backend::{id_value, BackendError, Query, TableBackend};
use crate::models::build_patch;
use crate::models::user::{NewUser, User, UserField};
use crate::tables::USERS;

pub struct UserRepo;

impl UserRepo {
    /// Insert a profile row, returning it as stored.
    pub async fn create<B>(backend: &B, input: &NewUser) -> Result<User, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = backend.insert(USERS, serde_json::to_value(input)?).await?;
        decode_one(row)
    }

    pub async fn find_by_id<B>(backend: &B, id: EntityId) -> Result<Option<User>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, USERS, id).await
    }

    /// Find a user by username (case-sensitive).
    pub async fn find_by_username<B>(
        backend: &B,
        username: &str,
    ) -> Result<Option<User>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = Query::new().eq("username", username).limit(1);
        let rows = backend.select(USERS, &query).await?;
        rows.into_iter().next().map(decode_one).transpose()
    }

    pub async fn find_by_email<B>(backend: &B, email: &str) -> Result<Option<User>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = Query::new().eq("email", email).limit(1);
        let rows = backend.select(USERS, &query).await?;
        rows.into_iter().next().map(decode_one).transpose()
    }

    /// List the profiles visible under `visibility`.
    ///
    /// Editors see every approved profile so assignees and attendees can be
    /// labelled; unapproved identities see only themselves.
    pub async fn list<B>(backend: &B, visibility: Visibility) -> Result<Vec<User>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = match visibility {
            Visibility::Everything => Query::new(),
            Visibility::Assigned(_) => {
                Query::new().eq("status", ApprovalStatus::Approved.as_str())
            }
            Visibility::ProfileOnly(id) => Query::new().eq("id", id_value(id)),
            Visibility::Nothing => return Ok(Vec::new()),
        };
        let rows = backend
            .select(USERS, &query.order_by("created_at", false))
            .await?;
        Ok(decode_rows(USERS, rows))
    }

    /// Apply whitelisted field updates. Returns `None` if no such user.
    pub async fn update<B>(
        backend: &B,
        id: EntityId,
        fields: &[UserField],
    ) -> Result<Option<User>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, USERS, id, build_patch(fields)).await
    }

    pub async fn delete<B>(backend: &B, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        delete_by_id(backend, USERS, id).await
    }
}
