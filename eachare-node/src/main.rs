// EACHare node: peer gossip, shared directory service and multi-origin downloads.

mod cli;
mod config;
mod connection;
mod download;
mod gossip;
mod node;
mod server;
mod shared;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::node::Node;

#[derive(Debug, Parser)]
#[command(name = "eachare", version, about = "EACHare peer node")]
struct Args {
    /// Address this node listens on and announces, as host:port.
    address: String,
    /// File with one neighbor host:port per line.
    neighbors: PathBuf,
    /// Directory whose files are shared and where downloads are written.
    shared_dir: PathBuf,
    /// Settings file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let Some((host, port)) = args.address.rsplit_once(':') else {
        bail!("address must be host:port, got {:?}", args.address);
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        bail!("address must be host:port, got {:?}", args.address);
    }

    let (cfg, config_warning) = config::load(args.config.as_deref());
    telemetry::init(&cfg.log_level);
    if let Some(w) = config_warning {
        warn!("{w}");
    }

    shared::verify(&args.shared_dir).context("shared directory")?;
    let node = Arc::new(Node::new(
        args.address.clone(),
        args.shared_dir.clone(),
        cfg.settings(),
    ));
    node.set_chunk_size(cfg.chunk_size);
    let neighbors = gossip::load_neighbors(&node, &args.neighbors)
        .with_context(|| format!("reading neighbors from {}", args.neighbors.display()))?;
    info!(address = %node.address(), neighbors, "node starting");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let listener = TcpListener::bind(node.address())
            .await
            .with_context(|| format!("binding {}", node.address()))?;
        tokio::spawn(server::run(node.clone(), listener));

        tokio::select! {
            r = cli::run(node.clone(), tokio::io::BufReader::new(tokio::io::stdin())) => r?,
            r = shutdown_signal() => {
                r?;
                info!("shutdown requested");
                gossip::bye(&node).await;
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;
    // Stdin reads may still be parked on a blocking thread.
    rt.shutdown_background();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
