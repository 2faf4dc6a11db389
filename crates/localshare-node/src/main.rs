use tracing::info;
use tracing_subscriber::EnvFilter;

use localshare_node::{Node, NodeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,localshare_node=debug,localshare_net=debug,localshare_store=info")
        }))
        .init();

    info!("Starting localshare v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    let node = Node::start(&config).await?;
    info!(
        addr = %node.local_addr(),
        client_code = %node.descriptor().client_code,
        "Node running"
    );

    node.notifications.peers.subscribe(|device| {
        info!(peer = %device.client_code, name = ?device.name, ip = ?device.ip, "Peer list changed");
    });

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    node.shutdown().await;

    Ok(())
}
