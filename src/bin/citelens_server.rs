//! `citelens-server`: the batch citation API.
//!
//! Configuration comes from the TOML file named by `CITELENS_CONFIG` or the
//! first argument; defaults apply otherwise. Logs go to stderr.

use std::sync::Arc;

use citelens::{ApiServer, AppConfig, HttpGateway};
use citelens_core::{BatchOrchestrator, InMemoryRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("citelens=info,citelens_core=info")
            }),
        )
        .init();

    let path = AppConfig::locate(std::env::args().skip(1));
    let config = AppConfig::load(path.as_deref())?;
    let batch_config = config.validate()?;
    tracing::info!(
        config = ?path,
        gateway = %config.gateway.url,
        global_concurrency = batch_config.global_concurrency,
        "citelens-server starting"
    );

    let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
    let repository = Arc::new(InMemoryRepository::new());
    let orchestrator = BatchOrchestrator::new(batch_config, gateway, repository)?;

    let mut server = ApiServer::start(orchestrator, &config.server).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    server.shutdown();
    server.stopped().await;

    tracing::info!("citelens-server shut down cleanly");
    Ok(())
}
