use anyhow::Result;
use clap::Parser;
use minifs::common::{parse_duration, Config};
use minifs::StorageNode;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "minifs-node")]
#[command(about = "minifs storage node - keeps file blobs on local disk")]
#[command(version)]
struct Args {
    /// Config file (defaults to ./minifs.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node ID (generated when omitted)
    #[arg(short, long)]
    id: Option<String>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// IP announced to the coordinator
    #[arg(long)]
    advertise_ip: Option<String>,

    /// Coordinator address (host:port)
    #[arg(short, long)]
    coordinator: Option<String>,

    /// Data directory for blobs
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Storage capacity offered to the cluster, in GiB
    #[arg(long)]
    capacity_gb: Option<u64>,

    /// Heartbeat period (e.g. 10s)
    #[arg(long, value_parser = parse_duration)]
    heartbeat_interval: Option<Duration>,

    /// Per read/write socket deadline, 0 to disable
    #[arg(long, value_parser = parse_duration)]
    io_timeout: Option<Duration>,

    /// Maximum connections served at once
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let log_level = args.log_level.clone().unwrap_or(config.log_level);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut node_config = config.node;
    if let Some(id) = args.id {
        node_config.node_id = Some(id);
    }
    if let Some(bind) = args.bind {
        node_config.bind_addr = bind;
    }
    if let Some(ip) = args.advertise_ip {
        node_config.advertise_ip = Some(ip);
    }
    if let Some(coordinator) = args.coordinator {
        node_config.coordinator_addr = coordinator;
    }
    if let Some(dir) = args.data_dir {
        node_config.storage_path = Some(dir);
    }
    if let Some(gb) = args.capacity_gb {
        node_config.capacity_bytes = gb
            .checked_mul(GIB)
            .ok_or_else(|| anyhow::anyhow!("capacity of {} GiB is too large", gb))?;
    }
    if let Some(interval) = args.heartbeat_interval {
        node_config.heartbeat_interval_ms = interval.as_millis() as u64;
    }
    if let Some(timeout) = args.io_timeout {
        node_config.io_timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(max) = args.max_connections {
        node_config.max_connections = max;
    }

    tracing::info!("Starting minifs storage node {}", minifs::VERSION);

    // Open storage, register and serve
    let node = StorageNode::open(node_config)?;
    node.serve().await?;

    Ok(())
}
