//! Repository for the `audit_logs` table.
//!
//! The log is append-only; the only destructive operation is a full clear
//! issued by a manager.

use idyll_core::access::Visibility;

use super::{decode_one, decode_rows};
use crate::backend::{id_value, BackendError, Filter, Query, TableBackend};
use crate::models::audit::{AuditLog, NewAuditLog};
use crate::tables::AUDIT_LOGS;

pub struct AuditRepo;

impl AuditRepo {
    pub async fn append<B>(backend: &B, entry: &NewAuditLog) -> Result<AuditLog, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = backend
            .insert(AUDIT_LOGS, serde_json::to_value(entry)?)
            .await?;
        decode_one(row)
    }

    /// The most recent `limit` entries, newest first. Editors see their own
    /// entries only.
    pub async fn list_recent<B>(
        backend: &B,
        visibility: Visibility,
        limit: usize,
    ) -> Result<Vec<AuditLog>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = match visibility {
            Visibility::Everything => Query::new(),
            Visibility::Assigned(id) => Query::new().eq("user_id", id_value(id)),
            Visibility::ProfileOnly(_) | Visibility::Nothing => return Ok(Vec::new()),
        };
        let rows = backend
            .select(AUDIT_LOGS, &query.order_by("timestamp", false).limit(limit))
            .await?;
        Ok(decode_rows(AUDIT_LOGS, rows))
    }

    /// Delete every entry. Returns the number removed.
    pub async fn clear<B>(backend: &B) -> Result<usize, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        // PostgREST refuses an unfiltered DELETE; match every row instead.
        let everything = Filter::Neq("id", id_value(uuid::Uuid::nil()));
        backend.delete(AUDIT_LOGS, &[everything]).await
    }
}
