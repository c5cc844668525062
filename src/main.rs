use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use presubmit_trigger::catalog::StaticCatalog;
use presubmit_trigger::config::{Config, Secrets};
use presubmit_trigger::github::OctocrabClient;
use presubmit_trigger::jobs::InMemoryJobStore;
use presubmit_trigger::server::{AppState, build_router};
use presubmit_trigger::webhooks::Context;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How long completed records are kept, covering GitHub's redelivery window.
const COMPLETED_RETENTION_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presubmit_trigger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&Config::path_from_env())?;
    let secrets = Secrets::from_env()?;

    let github = OctocrabClient::from_token(secrets.github_token, config.bot_login.clone())
        .context("building GitHub client")?;
    let catalog = StaticCatalog::from_config(config.catalog.clone())?;
    let listen = config.listen;

    let jobs = InMemoryJobStore::new();
    spawn_pruning(jobs.clone());
    let ctx = Context::new(Arc::new(github), jobs, catalog, config)
        .context("compiling command patterns")?;
    let app = build_router(AppState::spawning(secrets.webhook_secret, Arc::new(ctx)));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    tracing::info!("listening on {}", listen);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drops completed job records so the in-memory store stays
/// bounded.
fn spawn_pruning(jobs: InMemoryJobStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::hours(COMPLETED_RETENTION_HOURS);
            match jobs.prune_completed(cutoff) {
                Ok(0) => {}
                Ok(pruned) => tracing::info!(pruned, "Pruned completed job records"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune job records"),
            }
        }
    });
}
