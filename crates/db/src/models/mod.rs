//! Row models, insert DTOs and whitelisted field updates.
//!
//! Each submodule contains:
//! - a row struct matching the remote table
//! - a `New*` DTO for inserts
//! - a `*Field` enum listing every column an update may touch, tagged with
//!   the [`FieldScope`] that decides who may issue it

pub mod audit;
pub mod meeting;
pub mod notification;
pub mod payout_record;
pub mod submission;
pub mod table;
pub mod task_record;
pub mod user;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use idyll_core::access::FieldScope;

/// One whitelisted column assignment.
pub trait FieldUpdate {
    fn column(&self) -> &'static str;

    fn value(&self) -> Value;

    fn scope(&self) -> FieldScope;
}

/// Fold field updates into a JSON patch object. Later updates to the same
/// column win.
pub fn build_patch<F: FieldUpdate>(fields: &[F]) -> Value {
    let patch: Map<String, Value> = fields
        .iter()
        .map(|field| (field.column().to_string(), field.value()))
        .collect();
    Value::Object(patch)
}

pub fn scopes_of<F: FieldUpdate>(fields: &[F]) -> impl Iterator<Item = FieldScope> + '_ {
    fields.iter().map(FieldUpdate::scope)
}

/// Deserialize `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize a missing or `null` flag as `true`.
pub(crate) fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

pub(crate) fn default_true() -> bool {
    true
}
