//! Change subscription loop.
//!
//! One forwarder task per remote table moves change events into a single
//! channel. One consumer drains everything pending and then runs a single
//! refresh, so a burst of changes costs one round of fetches and at most
//! one refresh runs at a time. A further task feeds auth-state changes to
//! the session store. All tasks stop on [`SyncHandle::unsubscribe`].

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use idyll_core::change::{ChangeEvent, ChangeKind};
use idyll_db::backend::{AuthBackend, AuthEvent, ChangeFeed};
use idyll_db::tables;

use crate::context::AppContext;

const CHANGE_BUFFER: usize = 64;

/// Live subscription. Dropping it without calling
/// [`unsubscribe`](Self::unsubscribe) leaves the tasks running until the
/// backend closes its feeds.
pub struct SyncHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop every listener and wait for them to finish.
    pub async fn unsubscribe(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sync task ended abnormally");
            }
        }
        tracing::info!("Unsubscribed from changes");
    }
}

/// Subscribe to every table and start refreshing `ctx` on change.
pub fn spawn(ctx: AppContext) -> SyncHandle {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
    let mut tasks = Vec::with_capacity(tables::ALL.len() + 2);

    // Subscribe before spawning so nothing after this call is missed.
    for table in tables::ALL {
        let feed = ctx.backend().subscribe(table);
        tasks.push(tokio::spawn(forward(table, feed, tx.clone(), cancel.clone())));
    }
    drop(tx);

    let auth_events = ctx.backend().auth_events();
    tasks.push(tokio::spawn(listen_auth(ctx.clone(), auth_events, cancel.clone())));
    tasks.push(tokio::spawn(consume(ctx, rx, cancel.clone())));

    tracing::info!(tables = tables::ALL.len(), "Subscribed to changes");
    SyncHandle { cancel, tasks }
}

async fn forward(
    table: &'static str,
    mut feed: broadcast::Receiver<ChangeEvent>,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            received = feed.recv() => match received {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(table, skipped, "Change feed lagged");
                    ChangeEvent::new(table, ChangeKind::Update)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    tracing::debug!(table, "Change forwarder stopped");
}

async fn consume(ctx: AppContext, mut rx: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) {
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(event) => event,
                None => break,
            },
        };
        let mut pending = 1usize;
        while rx.try_recv().is_ok() {
            pending += 1;
        }
        tracing::debug!(table = %first.table, kind = ?first.kind, pending, "Remote change");
        ctx.refresh().await;
    }
    tracing::debug!("Change consumer stopped");
}

async fn listen_auth(
    ctx: AppContext,
    mut events: broadcast::Receiver<AuthEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth events lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        ctx.handle_auth_event(event).await;
    }
    tracing::debug!("Auth listener stopped");
}
