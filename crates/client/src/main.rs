//! `airdrop-daily` -- resets every "checked today" mark once per interval.
//!
//! # Environment variables
//!
//! | Variable              | Required | Default                     |
//! |-----------------------|----------|-----------------------------|
//! | `API_BASE_URL`        | no       | `http://localhost:3000/api` |
//! | `API_USERNAME`        | yes      | --                          |
//! | `API_PASSWORD`        | yes      | --                          |
//! | `RESET_INTERVAL_SECS` | no       | `86400`                     |

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airdrop_client::config::ClientConfig;
use airdrop_client::coordinator::{MutationCoordinator, MutationOutcome};
use airdrop_client::gateway::HttpGateway;
use airdrop_client::identity::PasswordSession;
use airdrop_client::notify::TracingSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airdrop_client=info,airdrop_daily=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let (username, password) = config.credentials()?;

    tracing::info!(
        api_url = %config.api_base_url,
        username,
        interval_secs = config.reset_interval_secs,
        "Starting airdrop-daily"
    );

    let session = PasswordSession::new(&config.api_base_url, username, password)
        .with_refresh_margin(config.token_refresh_margin());
    session
        .login()
        .await
        .context("Initial login failed")?;

    let coordinator = MutationCoordinator::new(
        Arc::new(HttpGateway::new(&config.api_base_url)),
        Arc::new(session),
        Arc::new(TracingSink),
    );

    let mut ticker = tokio::time::interval(config.reset_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => run_once(&coordinator).await,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl-C), stopping");
                break;
            }
        }
    }

    Ok(())
}

async fn run_once(coordinator: &MutationCoordinator) {
    if let Err(e) = coordinator.refresh().await {
        tracing::error!(error = %e, "Could not load projects, skipping this round");
        return;
    }

    match coordinator.reset_all_marks().await {
        Ok(MutationOutcome::Applied) => {
            tracing::info!(
                active = coordinator.active_projects().len(),
                "Daily reset finished"
            );
        }
        Ok(other) => tracing::warn!(outcome = ?other, "Daily reset did not apply"),
        Err(e) => tracing::error!(error = %e, "Daily reset failed"),
    }
}
