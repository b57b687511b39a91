//! Table capability over PostgREST.
//!
//! Filters are encoded as PostgREST operators (`eq.`, `neq.`, `cs.{}`,
//! `in.()`), ordering as `order=column.asc|desc`. Writes ask for
//! `Prefer: return=representation` so the stored rows come back.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use super::{ensure_success, Inner, RestBackend};
use crate::backend::{BackendError, Filter, Query, TableBackend};

const RETURN_REPRESENTATION: &str = "return=representation";

/// PostgREST unique_violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Quote list items containing PostgREST delimiters.
fn list_item(value: &Value) -> String {
    let raw = scalar(value);
    if raw.contains([',', '(', ')', '{', '}', '"', ' ']) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}

pub(super) fn encode_filter(filter: &Filter) -> (String, String) {
    let encoded = match filter {
        Filter::Eq(_, Value::Null) => "is.null".to_string(),
        Filter::Neq(_, Value::Null) => "not.is.null".to_string(),
        Filter::Eq(_, value) => format!("eq.{}", scalar(value)),
        Filter::Neq(_, value) => format!("neq.{}", scalar(value)),
        Filter::Contains(_, Value::Array(items)) => {
            let items: Vec<String> = items.iter().map(list_item).collect();
            format!("cs.{{{}}}", items.join(","))
        }
        Filter::Contains(_, value) => format!("cs.{{{}}}", list_item(value)),
        Filter::In(_, values) => {
            let items: Vec<String> = values.iter().map(list_item).collect();
            format!("in.({})", items.join(","))
        }
    };
    (filter.column().to_string(), encoded)
}

pub(super) fn encode_query(query: &Query) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    pairs.extend(query.filters.iter().map(encode_filter));
    if let Some(order) = query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Turn a failed write into a unique violation when the SQLSTATE says so.
fn classify_write_failure(table: &str, err: BackendError) -> BackendError {
    let BackendError::Api { status: 409, body } = &err else {
        return err;
    };
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    if parsed.code.as_deref() != Some(UNIQUE_VIOLATION) {
        return err;
    }
    // details: `Key (username)=(kai) already exists.`
    let column = parsed
        .details
        .as_deref()
        .and_then(|d| d.strip_prefix("Key ("))
        .and_then(|d| d.split_once(')'))
        .map(|(column, _)| column.to_string())
        .unwrap_or_else(|| "id".to_string());
    BackendError::UniqueViolation {
        table: table.to_string(),
        column,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

impl Inner {
    pub(super) async fn select_rows(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<Value>, BackendError> {
        let response = self
            .request(Method::GET, self.rest_url(table))
            .await
            .query(&encode_query(query))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json::<Vec<Value>>().await?)
    }

    async fn write(
        &self,
        method: Method,
        table: &str,
        filters: &[Filter],
        body: Option<&Value>,
    ) -> Result<Vec<Value>, BackendError> {
        let pairs: Vec<(String, String)> = filters.iter().map(encode_filter).collect();
        let mut request = self
            .request(method, self.rest_url(table))
            .await
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&pairs);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        match ensure_success(response).await {
            Ok(response) => Ok(response.json::<Vec<Value>>().await?),
            Err(e) => Err(classify_write_failure(table, e)),
        }
    }
}

#[async_trait]
impl TableBackend for RestBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.inner.select_rows(table, query).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let rows = self
            .inner
            .write(Method::POST, table, &[], Some(&row))
            .await?;
        rows.into_iter().next().ok_or_else(|| BackendError::Api {
            status: 403,
            body: format!("inserted row in {table} is not visible to this session"),
        })
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.inner
            .write(Method::PATCH, table, filters, Some(&patch))
            .await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, BackendError> {
        let rows = self.inner.write(Method::DELETE, table, filters, None).await?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn encodes_scalar_filters() {
        let id = "5b1f0c1e-0000-4000-8000-000000000001";
        assert_eq!(
            encode_filter(&Filter::Eq("assigned_to", json!(id))),
            ("assigned_to".into(), format!("eq.{id}"))
        );
        assert_eq!(
            encode_filter(&Filter::Eq("read", json!(false))),
            ("read".into(), "eq.false".into())
        );
        assert_eq!(
            encode_filter(&Filter::Neq("deadline", Value::Null)),
            ("deadline".into(), "not.is.null".into())
        );
    }

    #[test]
    fn encodes_array_filters_with_quoting() {
        assert_eq!(
            encode_filter(&Filter::Contains("attendees", json!(["a", "b"]))).1,
            "cs.{a,b}"
        );
        assert_eq!(
            encode_filter(&Filter::In("name", vec![json!("x"), json!("y,z")])).1,
            r#"in.(x,"y,z")"#
        );
    }

    #[test]
    fn query_includes_select_order_and_limit() {
        let query = Query::new()
            .eq("user_id", "u1")
            .order_by("timestamp", false)
            .limit(100);
        let pairs = encode_query(&query);
        assert_eq!(pairs[0], ("select".into(), "*".into()));
        assert!(pairs.contains(&("user_id".into(), "eq.u1".into())));
        assert!(pairs.contains(&("order".into(), "timestamp.desc".into())));
        assert!(pairs.contains(&("limit".into(), "100".into())));
    }

    #[test]
    fn unique_violation_names_the_column() {
        let err = BackendError::Api {
            status: 409,
            body: r#"{"code":"23505","details":"Key (username)=(kai) already exists.","message":"duplicate key"}"#.into(),
        };
        assert_matches!(
            classify_write_failure("users", err),
            BackendError::UniqueViolation { column, .. } if column == "username"
        );
    }

    #[test]
    fn other_conflicts_pass_through() {
        let err = BackendError::Api {
            status: 409,
            body: r#"{"code":"23503","details":"foreign key"}"#.into(),
        };
        assert_matches!(
            classify_write_failure("task_records", err),
            BackendError::Api { status: 409, .. }
        );
    }
}
