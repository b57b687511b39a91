//! `idyll-client` -- headless client agent.
//!
//! Resolves the persisted session, optionally signs in, subscribes to
//! remote changes and logs every feed entry and alert until interrupted.
//! Useful for watching a workspace from a terminal and for exercising the
//! client core against a live project.
//!
//! # Environment variables
//!
//! | Variable          | Required | Default | Description                         |
//! |-------------------|----------|---------|-------------------------------------|
//! | `IDYLL_LOGIN`     | no       | --      | Email or username to sign in with   |
//! | `IDYLL_PASSWORD`  | no       | --      | Password for `IDYLL_LOGIN`          |
//!
//! See [`ClientConfig::from_env`] for the connection settings. The first
//! command-line argument, if any, is treated as the location to open.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idyll_client::local::LocalStore;
use idyll_client::{AppContext, ClientConfig};
use idyll_db::backend::SharedBackend;
use idyll_db::RestBackend;
use idyll_events::{AlertReason, ClientEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idyll_client=debug,idyll_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let rest = RestBackend::new(config.rest_config()).context("Failed to build HTTP client")?;
    let local = LocalStore::open(&config.state_dir)
        .with_context(|| format!("Failed to open state dir {}", config.state_dir.display()))?;

    tracing::info!(backend = %config.backend_url, "Starting idyll-client");

    let backend: SharedBackend = Arc::new(rest.clone());
    let deep_link = std::env::args().nth(1);
    let ctx = AppContext::new(config, backend, local, deep_link.as_deref());
    let mut events = ctx.subscribe_events();

    match ctx.initialize().await {
        Some(user) => tracing::info!(user = %user.display_name(), "Session restored"),
        None => tracing::info!("No stored session"),
    }

    if let (Ok(login), Ok(password)) = (std::env::var("IDYLL_LOGIN"), std::env::var("IDYLL_PASSWORD")) {
        if !ctx.session().is_authenticated().await {
            let user = ctx.sign_in(&login, &password).await.context("Sign-in failed")?;
            tracing::info!(user = %user.display_name(), role = %user.role, "Signed in");
        }
    }

    let sync = ctx.subscribe_to_changes();
    tracing::info!(screen = ?ctx.screen().await, "Watching for changes");

    tokio::select! {
        _ = log_events(&mut events) => {}
        _ = shutdown_signal() => {}
    }

    tracing::info!("Shutting down");
    let _ = tokio::time::timeout(Duration::from_secs(5), sync.unsubscribe()).await;
    rest.shutdown();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn log_events(events: &mut broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::FeedEntryAdded { key, category, title }) => {
                tracing::info!(%key, ?category, %title, "New notification");
            }
            Ok(ClientEvent::Alert { reason, .. }) => match reason {
                AlertReason::AssignmentSent => tracing::info!("Alert: assignment sent"),
                AlertReason::NewItems { count } => tracing::info!(count, "Alert: new items"),
            },
            Ok(event) => tracing::debug!(event = event.name(), "Client event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
