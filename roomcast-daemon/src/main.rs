//! Roomcast Daemon - room-scoped broadcast node
//!
//! Hosts one or more cluster nodes linked by an in-process bus. Clients
//! connect over Unix sockets (`<socket_dir>/roomcast-<n>.sock`), join rooms
//! and emit broadcasts that reach exactly the members of the targeted rooms
//! on every node.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomcast_broadcaster::LocalBus;
use roomcast_daemon::config::NodeConfig;
use roomcast_daemon::server::NodeServer;
use roomcast_daemon::socket_utils::node_socket_path;

#[derive(Parser, Debug)]
#[command(name = "roomcast-daemon", version, about = "Room-scoped broadcast node")]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for node sockets
    #[arg(long)]
    socket_dir: Option<String>,

    /// Cluster node id
    #[arg(long)]
    node_id: Option<String>,

    /// Number of nodes to host in this process
    #[arg(long)]
    nodes: Option<usize>,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(socket_dir) = self.socket_dir {
            config.socket_dir = socket_dir;
        }
        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration, then apply overrides before the single validation
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_from(path),
        None => NodeConfig::load(),
    }
    .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()
        .context("Invalid configuration")?;

    // Initialize logging (RUST_LOG wins over config)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    info!("Starting Roomcast Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.config_path.display());

    let socket_dir = config.socket_dir()
        .context("Failed to resolve socket directory")?;
    let bus = LocalBus::new(config.bus_capacity);

    // Start nodes
    let mut servers = Vec::new();
    for (index, node_id) in config.node_ids().into_iter().enumerate() {
        let server = NodeServer::new(node_socket_path(&socket_dir, index), node_id, &bus);
        server.start().await
            .with_context(|| format!("Failed to start node {}", server.node_id()))?;
        servers.push(server);
    }

    info!("Roomcast ready with {} node(s)", servers.len());

    // Wait for shutdown
    tokio::signal::ctrl_c().await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    // Cleanup
    for server in &servers {
        if let Err(e) = server.stop().await {
            warn!("Failed to stop node {}: {}", server.node_id(), e);
        }
    }

    info!("Roomcast daemon stopped");
    Ok(())
}
