//! Repository for the `user_submissions` table.

use serde_json::json;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id, update_by_id};
use crate::backend::{BackendError, Query, TableBackend};
use crate::models::submission::{NewSubmission, SubmissionStatus, UserSubmission};
use crate::tables::USER_SUBMISSIONS;

pub struct SubmissionRepo;

impl SubmissionRepo {
    pub async fn create<B>(
        backend: &B,
        input: &NewSubmission,
    ) -> Result<UserSubmission, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = backend
            .insert(USER_SUBMISSIONS, serde_json::to_value(input)?)
            .await?;
        decode_one(row)
    }

    pub async fn find_by_id<B>(
        backend: &B,
        id: EntityId,
    ) -> Result<Option<UserSubmission>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, USER_SUBMISSIONS, id).await
    }

    /// Every submission, newest first.
    pub async fn list<B>(backend: &B) -> Result<Vec<UserSubmission>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = Query::new().order_by("created_at", false);
        let rows = backend.select(USER_SUBMISSIONS, &query).await?;
        Ok(decode_rows(USER_SUBMISSIONS, rows))
    }

    pub async fn set_status<B>(
        backend: &B,
        id: EntityId,
        status: SubmissionStatus,
    ) -> Result<Option<UserSubmission>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, USER_SUBMISSIONS, id, json!({ "status": status.as_str() })).await
    }

    pub async fn delete<B>(backend: &B, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        delete_by_id(backend, USER_SUBMISSIONS, id).await
    }
}
