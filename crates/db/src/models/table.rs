//! Task-table and payout-table models.
//!
//! Both flavors share one row shape; [`TableKind`] picks the remote table
//! and the record table it partitions.

use serde::{Deserialize, Serialize};
use idyll_core::audit::ObjectType;
use idyll_core::types::{EntityId, Timestamp};

use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Task,
    Payout,
}

impl TableKind {
    pub const fn table_name(self) -> &'static str {
        match self {
            TableKind::Task => tables::TASK_TABLES,
            TableKind::Payout => tables::PAYOUT_TABLES,
        }
    }

    pub const fn record_table_name(self) -> &'static str {
        match self {
            TableKind::Task => tables::TASK_RECORDS,
            TableKind::Payout => tables::PAYOUT_RECORDS,
        }
    }

    pub const fn object_type(self) -> ObjectType {
        match self {
            TableKind::Task => ObjectType::TaskTable,
            TableKind::Payout => ObjectType::PayoutTable,
        }
    }
}

/// A row from `task_tables` or `payout_tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    pub id: EntityId,
    pub name: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub created_by: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRecordTable {
    pub name: String,
    pub created_by: EntityId,
}
