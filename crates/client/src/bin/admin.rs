//! `idyll-admin` -- operator tasks against the remote store.
//!
//! Uses the service key, so it bypasses row-level security. The first
//! manager is provisioned here rather than baked into the client.
//!
//! ```text
//! idyll-admin promote <email>   approve the profile and make it a manager
//! ```
//!
//! # Environment variables
//!
//! | Variable             | Required | Description             |
//! |----------------------|----------|-------------------------|
//! | `IDYLL_BACKEND_URL`  | yes      | Remote project URL      |
//! | `IDYLL_SERVICE_KEY`  | yes      | Service-role API key    |

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idyll_client::ClientConfig;
use idyll_core::roles::{ApprovalStatus, Role};
use idyll_db::models::user::UserField;
use idyll_db::repositories::UserRepo;
use idyll_db::{RestBackend, RestConfig};

const USAGE: &str = "usage: idyll-admin promote <email>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idyll_admin=info,idyll_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let email = match args.as_slice() {
        [command, email] if command == "promote" => email.trim().to_string(),
        _ => bail!(USAGE),
    };

    let backend_url = std::env::var("IDYLL_BACKEND_URL").context("IDYLL_BACKEND_URL must be set")?;
    let service_key = std::env::var("IDYLL_SERVICE_KEY").context("IDYLL_SERVICE_KEY must be set")?;
    let defaults = ClientConfig::default();
    let backend = RestBackend::new(RestConfig {
        base_url: backend_url,
        api_key: service_key,
        request_timeout: defaults.request_timeout,
        poll_interval: defaults.poll_interval,
    })?;

    promote(&backend, &email).await
}

async fn promote(backend: &RestBackend, email: &str) -> anyhow::Result<()> {
    let Some(user) = UserRepo::find_by_email(backend, email).await? else {
        bail!("no profile with email {email}; the account must sign up first");
    };

    let fields = [UserField::Role(Role::Manager), UserField::Status(ApprovalStatus::Approved)];
    let updated = UserRepo::update(backend, user.id, &fields)
        .await?
        .with_context(|| format!("profile {} disappeared during update", user.id))?;

    tracing::info!(
        user_id = %updated.id,
        username = %updated.username,
        role = %updated.role,
        status = %updated.status,
        "Promoted to manager",
    );
    Ok(())
}
