//! Repository for `task_tables` and `payout_tables`.

use serde_json::Value;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, delete_by_id, find_by_id};
use crate::backend::{id_value, BackendError, Filter, Query, TableBackend};
use crate::models::table::{NewRecordTable, RecordTable, TableKind};

pub struct TableRepo;

impl TableRepo {
    pub async fn create<B>(
        backend: &B,
        kind: TableKind,
        input: &NewRecordTable,
    ) -> Result<RecordTable, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = backend
            .insert(kind.table_name(), serde_json::to_value(input)?)
            .await?;
        decode_one(row)
    }

    pub async fn find_by_id<B>(
        backend: &B,
        kind: TableKind,
        id: EntityId,
    ) -> Result<Option<RecordTable>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, kind.table_name(), id).await
    }

    /// List every table of `kind`, oldest first.
    pub async fn list<B>(backend: &B, kind: TableKind) -> Result<Vec<RecordTable>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = Query::new().order_by("created_at", true);
        let rows = backend.select(kind.table_name(), &query).await?;
        Ok(decode_rows(kind.table_name(), rows))
    }

    /// List the tables with the given ids, oldest first.
    pub async fn list_by_ids<B>(
        backend: &B,
        kind: TableKind,
        ids: &[EntityId],
    ) -> Result<Vec<RecordTable>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Value> = ids.iter().copied().map(id_value).collect();
        let query = Query::new()
            .filter(Filter::In("id", ids))
            .order_by("created_at", true);
        let rows = backend.select(kind.table_name(), &query).await?;
        Ok(decode_rows(kind.table_name(), rows))
    }

    /// Delete a table together with every record it partitions.
    pub async fn delete<B>(backend: &B, kind: TableKind, id: EntityId) -> Result<bool, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let records = [Filter::Eq("table_id", id_value(id))];
        let removed = backend.delete(kind.record_table_name(), &records).await?;
        tracing::debug!(table = kind.table_name(), %id, records = removed, "Deleted table records");
        delete_by_id(backend, kind.table_name(), id).await
    }
}
