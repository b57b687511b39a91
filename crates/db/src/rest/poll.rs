//! Change feed over periodic polling.
//!
//! One poller task runs per subscribed table. Each tick it re-reads the
//! table, fingerprints every row by id with SHA-256, and compares against
//! the previous tick. The first successful read only establishes the
//! baseline. The task exits when the backend shuts down or when the last
//! receiver is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use idyll_core::change::{ChangeEvent, ChangeKind};

use super::Inner;
use crate::backend::Query;

/// Row id -> hex digest of the row's JSON.
type Fingerprints = HashMap<String, String>;

pub(super) fn spawn_poller(inner: Arc<Inner>, table: String, sender: broadcast::Sender<ChangeEvent>) {
    tokio::spawn(async move {
        run(inner, table, sender).await;
    });
}

async fn run(inner: Arc<Inner>, table: String, sender: broadcast::Sender<ChangeEvent>) {
    let mut interval = tokio::time::interval(inner.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<Fingerprints> = None;

    tracing::debug!(table = %table, "Change poller started");

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                tracing::debug!(table = %table, "Change poller cancelled");
                break;
            }
            _ = interval.tick() => {
                if sender.receiver_count() == 0 {
                    tracing::debug!(table = %table, "No subscribers left, stopping poller");
                    break;
                }
                match inner.select_rows(&table, &Query::new()).await {
                    Ok(rows) => {
                        let current = fingerprint(&rows);
                        if let Some(previous) = &previous {
                            for kind in diff(previous, &current) {
                                let _ = sender.send(ChangeEvent::new(table.as_str(), kind));
                            }
                        }
                        previous = Some(current);
                    }
                    Err(e) => {
                        tracing::debug!(table = %table, error = %e, "Change poll failed");
                    }
                }
            }
        }
    }
}

fn fingerprint(rows: &[Value]) -> Fingerprints {
    rows.iter()
        .filter_map(|row| {
            let id = match row.get("id")? {
                Value::String(id) => id.clone(),
                other => other.to_string(),
            };
            let digest = Sha256::digest(row.to_string().as_bytes());
            Some((id, format!("{digest:x}")))
        })
        .collect()
}

/// Kinds of change between two snapshots, at most one of each.
fn diff(previous: &Fingerprints, current: &Fingerprints) -> Vec<ChangeKind> {
    let mut kinds = Vec::new();
    if current.keys().any(|id| !previous.contains_key(id)) {
        kinds.push(ChangeKind::Insert);
    }
    let updated = current
        .iter()
        .any(|(id, hash)| previous.get(id).is_some_and(|old| old != hash));
    if updated {
        kinds.push(ChangeKind::Update);
    }
    if previous.keys().any(|id| !current.contains_key(id)) {
        kinds.push(ChangeKind::Delete);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_snapshots_produce_no_changes() {
        let rows = vec![json!({"id": "1", "name": "a"})];
        assert!(diff(&fingerprint(&rows), &fingerprint(&rows)).is_empty());
    }

    #[test]
    fn detects_each_kind_once() {
        let before = fingerprint(&[
            json!({"id": "1", "status": "Editing"}),
            json!({"id": "2", "status": "Done"}),
        ]);
        let after = fingerprint(&[
            json!({"id": "1", "status": "Done"}),
            json!({"id": "3", "status": "Not Started"}),
            json!({"id": "4", "status": "Not Started"}),
        ]);
        assert_eq!(
            diff(&before, &after),
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[test]
    fn rows_without_id_are_ignored() {
        let prints = fingerprint(&[json!({"name": "orphan"}), json!({"id": 7})]);
        assert_eq!(prints.len(), 1);
        assert!(prints.contains_key("7"));
    }
}
