use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use wavecast_server::{Cli, ServerConfig, http};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let config = ServerConfig::from_cli(Cli::parse());
    let addr = config.addr;

    info!(
        %addr,
        source = %config.source.display(),
        paced = config.pace_increment.is_some(),
        "starting wavecast server"
    );

    let app = http::router(Arc::new(config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;

    Ok(())
}
