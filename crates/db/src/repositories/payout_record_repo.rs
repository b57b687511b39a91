//! Repository for the `payout_records` table.

use serde_json::json;
use idyll_core::access::Visibility;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id, row_with, update_by_id};
use crate::backend::{id_value, BackendError, Query, TableBackend};
use crate::models::build_patch;
use crate::models::payout_record::{NewPayoutRecord, PayoutRecord, PayoutRecordField};
use crate::tables::PAYOUT_RECORDS;

pub struct PayoutRecordRepo;

impl PayoutRecordRepo {
    pub async fn create<B>(
        backend: &B,
        input: &NewPayoutRecord,
        created_by: EntityId,
    ) -> Result<PayoutRecord, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = row_with(input, [("created_by", json!(created_by))])?;
        decode_one(backend.insert(PAYOUT_RECORDS, row).await?)
    }

    pub async fn find_by_id<B>(
        backend: &B,
        id: EntityId,
    ) -> Result<Option<PayoutRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, PAYOUT_RECORDS, id).await
    }

    pub async fn list<B>(
        backend: &B,
        visibility: Visibility,
    ) -> Result<Vec<PayoutRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = match visibility {
            Visibility::Everything => Query::new(),
            Visibility::Assigned(id) => Query::new().eq("assigned_to", id_value(id)),
            Visibility::ProfileOnly(_) | Visibility::Nothing => return Ok(Vec::new()),
        };
        let rows = backend
            .select(PAYOUT_RECORDS, &query.order_by("created_at", true))
            .await?;
        Ok(decode_rows(PAYOUT_RECORDS, rows))
    }

    pub async fn update<B>(
        backend: &B,
        id: EntityId,
        fields: &[PayoutRecordField],
    ) -> Result<Option<PayoutRecord>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, PAYOUT_RECORDS, id, build_patch(fields)).await
    }

    pub async fn delete<B>(backend: &B, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        delete_by_id(backend, PAYOUT_RECORDS, id).await
    }
}
