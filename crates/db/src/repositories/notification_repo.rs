//! Repository for the `notifications` table.

use serde_json::json;
use idyll_core::types::EntityId;

use super::{decode_one, decode_rows, find_by_id, update_by_id};
use crate::backend::{id_value, BackendError, Filter, Query, TableBackend};
use crate::models::notification::{NewNotification, Notification};
use crate::tables::NOTIFICATIONS;

pub struct NotificationRepo;

impl NotificationRepo {
    pub async fn create<B>(
        backend: &B,
        input: &NewNotification,
    ) -> Result<Notification, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let row = backend
            .insert(NOTIFICATIONS, serde_json::to_value(input)?)
            .await?;
        decode_one(row)
    }

    pub async fn find_by_id<B>(
        backend: &B,
        id: EntityId,
    ) -> Result<Option<Notification>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        find_by_id(backend, NOTIFICATIONS, id).await
    }

    /// Notifications addressed to `user_id`, newest first.
    pub async fn list_for_user<B>(
        backend: &B,
        user_id: EntityId,
    ) -> Result<Vec<Notification>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let query = Query::new()
            .eq("user_id", id_value(user_id))
            .order_by("created_at", false);
        let rows = backend.select(NOTIFICATIONS, &query).await?;
        Ok(decode_rows(NOTIFICATIONS, rows))
    }

    pub async fn mark_read<B>(
        backend: &B,
        id: EntityId,
    ) -> Result<Option<Notification>, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        update_by_id(backend, NOTIFICATIONS, id, json!({ "read": true })).await
    }

    /// Mark every unread notification of `user_id` as read.
    pub async fn mark_all_read<B>(backend: &B, user_id: EntityId) -> Result<usize, BackendError>
    where
        B: TableBackend + ?Sized,
    {
        let filters = [
            Filter::Eq("user_id", id_value(user_id)),
            Filter::Eq("read", json!(false)),
        ];
        let rows = backend
            .update(NOTIFICATIONS, &filters, json!({ "read": true }))
            .await?;
        Ok(rows.len())
    }
}
