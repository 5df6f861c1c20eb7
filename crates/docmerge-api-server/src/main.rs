//! API Server Binary Entry Point

use anyhow::Context;
use docmerge_api_server::{start_server, ApiState};
use docmerge_core::DocmergeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docmerge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var_os("DOCMERGE_CONFIG").map(std::path::PathBuf::from);
    let config =
        DocmergeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let state = ApiState::from_config(&config);

    tracing::info!("Starting docmerge API server");
    start_server(&config.server.addr, state)
        .await
        .with_context(|| format!("Server on {} failed", config.server.addr))?;

    Ok(())
}
