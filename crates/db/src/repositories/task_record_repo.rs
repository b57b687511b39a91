//! Repository for the `task_records` table.

use serde_json::json;
use idyll_core::access::Visibility;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id, row_with, update_by_id};
use crate::backend::{id_value, BackendError, Query, TableBackend};
use crate::models::build_patch;
use crate::models::task_record::{NewTaskRecord, TaskRecord, TaskRecordField};
use crate::tables::TASK_RECORDS;

pub struct TaskRecordRepo;

impl TaskRecordRepo {
    pub async fn create<B>(
        backend: &B,
        input: &NewTaskRecord,
        created_by: EntityId,
    ) -> Result<TaskRecord, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = row_with(input, [("created_by", json!(created_by))])?;
        decode_one(backend.insert(TASK_RECORDS, row).await?)
    }

    pub async fn find_by_id<B>(
        backend: &B,
        id: EntityId,
    ) -> Result<Option<TaskRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, TASK_RECORDS, id).await
    }

    /// List tasks visible under `visibility`, oldest first.
    pub async fn list<B>(
        backend: &B,
        visibility: Visibility,
    ) -> Result<Vec<TaskRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = match visibility {
            Visibility::Everything => Query::new(),
            Visibility::Assigned(id) => Query::new().eq("assigned_to", id_value(id)),
            Visibility::ProfileOnly(_) | Visibility::Nothing => return Ok(Vec::new()),
        };
        let rows = backend
            .select(TASK_RECORDS, &query.order_by("created_at", true))
            .await?;
        Ok(decode_rows(TASK_RECORDS, rows))
    }

    pub async fn update<B>(
        backend: &B,
        id: EntityId,
        fields: &[TaskRecordField],
    ) -> Result<Option<TaskRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, TASK_RECORDS, id, build_patch(fields)).await
    }

    pub async fn delete<B>(backend: &B, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        delete_by_id(backend, TASK_RECORDS, id).await
    }
}
