//! `mcp-gateway` binary: load configuration, open the registry, serve the
//! HTTP API until Ctrl-C, then flush the registry.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use mcp_gateway::{server, Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_gateway::init_tracing();

    let config = GatewayConfig::load().context("failed to load gateway configuration")?;
    let gateway = Arc::new(Gateway::from_config(&config).context("failed to initialize gateway")?);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        api = server::API_PREFIX,
        registry_file = %config.registry_file().display(),
        discovery_url = %config.discovery.url,
        pid = std::process::id(),
        "=== MCP gateway starting ==="
    );

    server::serve(listener, gateway.clone(), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    gateway.registry().close().await;
    tracing::info!("MCP gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
