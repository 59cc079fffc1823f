//! portmapper-server - RPC service for opening and closing port mappings
//!
//! Discovers the gateway once at startup and serves `OpenPort` / `ClosePort`
//! until interrupted.

use anyhow::Context;
use clap::Parser;
use portmapper::config::ServerConfig;
use portmapper::gateway::Orchestrator;
use portmapper::rpc::{RpcHandler, RpcServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// RPC service for NAT port mappings
#[derive(Parser)]
#[command(name = "portmapper-server", version)]
struct Args {
    /// Address to listen on (ip:port), overrides the config file
    #[arg(short, long, alias = "server")]
    listen: Option<SocketAddr>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portmapper::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("could not load config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let orchestrator = Orchestrator::discover()
        .await
        .context("could not get a gateway")?;
    info!(
        "Gateways: NAT-PMP {}, UPnP {}",
        if orchestrator.natpmp_available() { "available" } else { "unavailable" },
        if orchestrator.upnp_available() { "available" } else { "unavailable" },
    );

    let handler = RpcHandler::new(Arc::new(orchestrator), config.defaults);
    let mut server = RpcServer::new(handler);
    server
        .start(config.listen)
        .await
        .context("failed to listen")?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
