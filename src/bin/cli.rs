//! CLI for file transfer and cluster inspection

use anyhow::Context;
use clap::{Parser, Subcommand};
use minifs::common::{format_bytes, parse_duration};
use minifs::coordinator::CoordinatorClient;
use minifs::ops::{cluster_status, get_file, put_file, remove_file};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "minifs")]
#[command(about = "minifs distributed file store CLI")]
#[command(version)]
struct Cli {
    /// Coordinator address (host:port)
    #[arg(long, default_value = "127.0.0.1:9000")]
    coordinator: String,

    /// Per read/write socket deadline
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    timeout: Duration,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Put {
        /// Local file
        file: PathBuf,

        /// Owner
        #[arg(long, default_value = "default")]
        user: String,
    },

    /// Download a file
    Get {
        /// File ID returned by put
        file_id: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },

    /// Delete a file from its nodes and the coordinator
    Rm {
        file_id: String,

        #[arg(long, default_value = "default")]
        user: String,
    },

    /// List a user's files
    Ls {
        #[arg(long, default_value = "default")]
        user: String,
    },

    /// Show online storage nodes
    Nodes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let timeout = (!cli.timeout.is_zero()).then_some(cli.timeout);
    let coordinator = CoordinatorClient::new(cli.coordinator).with_timeout(timeout);

    match cli.command {
        Commands::Put { file, user } => {
            let mut source = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;
            let size = source.metadata().await?.len();
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());

            let report = put_file(&coordinator, &user, &name, &mut source, size, timeout).await?;
            println!("Uploaded {} ({})", name, format_bytes(report.bytes));
            println!("  File ID: {}", report.file_id);
            println!("  Node: {}", report.node_id);
        }

        Commands::Get { file_id, output } => {
            let mut sink = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("cannot create {}", output.display()))?;
            let res = get_file(&coordinator, &file_id, &mut sink, timeout).await;
            match res {
                Ok(bytes) => {
                    sink.flush().await?;
                    println!("Downloaded {} to {}", format_bytes(bytes), output.display());
                }
                Err(e) => {
                    drop(sink);
                    let _ = tokio::fs::remove_file(&output).await;
                    return Err(e.into());
                }
            }
        }

        Commands::Rm { file_id, user } => {
            let report = remove_file(&coordinator, &file_id, &user, timeout).await?;
            println!("Deleted {}", file_id);
            println!("  Blobs removed: {}", report.blobs_deleted);
            if report.blob_failures > 0 {
                println!("  Nodes that could not delete: {}", report.blob_failures);
            }
        }

        Commands::Ls { user } => {
            let files = coordinator.user_files(&user).await?;
            if files.is_empty() {
                println!("No files for {}", user);
            }
            for f in files {
                println!(
                    "{}  {:>12}  {}  {}",
                    f.file_id,
                    format_bytes(f.file_size),
                    f.upload_time.format("%Y-%m-%d %H:%M:%S"),
                    f.file_name
                );
            }
        }

        Commands::Nodes => {
            let report = cluster_status(&coordinator).await?;
            println!("Online nodes: {}", report.nodes.len());
            for n in &report.nodes {
                println!(
                    "  {}  {}  {} free of {}",
                    n.node_id,
                    n.address(),
                    format_bytes(n.free_bytes()),
                    format_bytes(n.capacity_bytes)
                );
            }
            println!(
                "Total: {} used, {} free",
                format_bytes(report.total_used),
                format_bytes(report.total_free())
            );
        }
    }

    Ok(())
}
