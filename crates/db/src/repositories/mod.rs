//! Per-table repositories.
//!
//! Each repository is a zero-sized struct with static async methods taking
//! the backend as their first argument. Methods are generic over
//! `B: TableBackend + ?Sized` so they accept both concrete backends and
//! `dyn Backend` trait objects.

pub mod audit_repo;
pub mod meeting_repo;
pub mod notification_repo;
pub mod payout_record_repo;
pub mod submission_repo;
pub mod table_repo;
pub mod task_record_repo;
pub mod user_repo;

pub use audit_repo::AuditRepo;
pub use meeting_repo::MeetingRepo;
pub use notification_repo::NotificationRepo;
pub use payout_record_repo::PayoutRecordRepo;
pub use submission_repo::SubmissionRepo;
pub use table_repo::TableRepo;
pub use task_record_repo::TaskRecordRepo;
pub use user_repo::UserRepo;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use idyll_core::types::EntityId;

use crate::backend::{id_value, BackendError, Filter, Query, TableBackend};
use crate::tables;

/// Decode rows, skipping (and logging) any that do not match the model.
pub(crate) fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(table, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}

pub(crate) fn decode_one<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    Ok(serde_json::from_value(row)?)
}

/// Serialize an insert DTO, adding extra columns on top.
pub(crate) fn row_with<T: Serialize>(
    input: &T,
    extra: impl IntoIterator<Item = (&'static str, Value)>,
) -> Result<Value, BackendError> {
    let mut row = serde_json::to_value(input)?;
    if let Value::Object(map) = &mut row {
        for (column, value) in extra {
            map.insert(column.to_string(), value);
        }
    }
    Ok(row)
}

pub(crate) fn by_id(id: EntityId) -> [Filter; 1] {
    [Filter::Eq("id", id_value(id))]
}

pub(crate) async fn find_by_id<B, T>(
    backend: &B,
    table: &str,
    id: EntityId,
) -> Result<Option<T>, BackendError>
where
    B: TableBackend + ?Sized,
    T: DeserializeOwned,
{
    let query = Query::new().eq("id", id_value(id)).limit(1);
    let rows = backend.select(table, &query).await?;
    rows.into_iter().next().map(decode_one).transpose()
}

pub(crate) async fn update_by_id<B, T>(
    backend: &B,
    table: &str,
    id: EntityId,
    mut patch: Value,
) -> Result<Option<T>, BackendError>
where
    B: TableBackend + ?Sized,
    T: DeserializeOwned,
{
    if tables::has_updated_at(table) {
        if let Value::Object(map) = &mut patch {
            map.insert("updated_at".into(), serde_json::json!(chrono::Utc::now()));
        }
    }
    let rows = backend.update(table, &by_id(id), patch).await?;
    rows.into_iter().next().map(decode_one).transpose()
}

pub(crate) async fn delete_by_id<B>(backend: &B, table: &str, id: EntityId) -> Result<bool, BackendError>
where
    B: TableBackend + ?Sized,
{
    Ok(backend.delete(table, &by_id(id)).await? > 0)
}
