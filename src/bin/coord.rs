//! Coordinator binary

use clap::{Parser, Subcommand};
use minifs::common::{parse_duration, Config};
use minifs::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minifs-coord")]
#[command(about = "minifs coordinator: node registry, placement and file index")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./minifs.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Mark a node offline after this long without a heartbeat (e.g. 30s)
        #[arg(long, value_parser = parse_duration)]
        heartbeat_timeout: Option<std::time::Duration>,

        /// Liveness sweep period (e.g. 10s)
        #[arg(long, value_parser = parse_duration)]
        sweep_interval: Option<std::time::Duration>,

        /// Per read/write socket deadline, 0 to disable
        #[arg(long, value_parser = parse_duration)]
        io_timeout: Option<std::time::Duration>,

        /// Maximum connections served at once
        #[arg(long)]
        max_connections: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file and environment, then override with CLI arguments
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            heartbeat_timeout,
            sweep_interval,
            io_timeout,
            max_connections,
        } => {
            let mut coord_config = config.coordinator;
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if let Some(timeout) = heartbeat_timeout {
                coord_config.heartbeat_timeout_ms = timeout.as_millis() as u64;
            }
            if let Some(interval) = sweep_interval {
                coord_config.sweep_interval_ms = interval.as_millis() as u64;
            }
            if let Some(timeout) = io_timeout {
                coord_config.io_timeout_ms = timeout.as_millis() as u64;
            }
            if let Some(max) = max_connections {
                coord_config.max_connections = max;
            }

            tracing::info!("Starting minifs coordinator {}", minifs::VERSION);
            Coordinator::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
