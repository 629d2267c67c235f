mod config;
mod executor;
mod mcp;
mod session;
mod ssh;
#[cfg(test)]
mod testing;
mod transport;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::mcp::McpSshService;
use crate::session::SessionManager;
use crate::ssh::RusshConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_ssh_server=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let connector = Arc::new(RusshConnector::new(config));
    let service = McpSshService::new(SessionManager::new(connector));

    tracing::info!("MCP SSH server listening on stdio");
    mcp::stdio::serve(service, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("stdio transport failed")?;

    Ok(())
}
