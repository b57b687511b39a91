//! Repository for the `meetings` table.

use serde_json::json;
use idyll_core::access::Visibility;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id, row_with, update_by_id};
use crate::backend::{BackendError, Filter, Query, TableBackend};
use crate::models::build_patch;
use crate::models::meeting::{Meeting, MeetingField, NewMeeting};
use crate::tables::MEETINGS;

pub struct MeetingRepo;

impl MeetingRepo {
    pub async fn create<B>(
        backend: &B,
        input: &NewMeeting,
        created_by: EntityId,
    ) -> Result<Meeting, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = row_with(input, [("created_by", json!(created_by))])?;
        decode_one(backend.insert(MEETINGS, row).await?)
    }

    pub async fn find_by_id<B>(backend: &B, id: EntityId) -> Result<Option<Meeting>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, MEETINGS, id).await
    }

    /// List meetings visible under `visibility`, soonest first.
    pub async fn list<B>(backend: &B, visibility: Visibility) -> Result<Vec<Meeting>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = match visibility {
            Visibility::Everything => Query::new(),
            Visibility::Assigned(id) => {
                Query::new().filter(Filter::Contains("attendees", json!([id])))
            }
            Visibility::ProfileOnly(_) | Visibility::Nothing => return Ok(Vec::new()),
        };
        let rows = backend
            .select(MEETINGS, &query.order_by("date", true))
            .await?;
        Ok(decode_rows(MEETINGS, rows))
    }

    pub async fn update<B>(
        backend: &B,
        id: EntityId,
        fields: &[MeetingField],
    ) -> Result<Option<Meeting>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, MEETINGS, id, build_patch(fields)).await
    }

    pub async fn delete<B>(backend: &B, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        delete_by_id(backend, MEETINGS, id).await
    }
}
