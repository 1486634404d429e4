use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use gatehouse_sync::application::services::SyncEngine;
use gatehouse_sync::infrastructure::remote::HttpRemoteApi;
use gatehouse_sync::infrastructure::status::LogStatusSink;
use gatehouse_sync::shared::{config::AppConfig, logging};
use gatehouse_sync::RemoteApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("gatehouse-syncd");

    let config = AppConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    info!(
        database = %config.database.url,
        remote = %config.remote.base_url,
        "starting sync engine"
    );

    let remote: Arc<dyn RemoteApi> =
        Arc::new(HttpRemoteApi::new(&config.remote).context("building remote API client")?);
    let engine = Arc::new(
        SyncEngine::new(config, remote, Arc::new(LogStatusSink))
            .await
            .context("initializing sync engine")?,
    );
    engine.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    engine.stop().await;

    let stats = engine.stats().await.context("reading final stats")?;
    info!(
        pending = stats.pending_actions,
        failed = stats.failed_actions,
        "sync engine shut down"
    );

    Ok(())
}
