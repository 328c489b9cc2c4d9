//! Relay server
//!
//! Run with: camstream-relay [--port 8080] [--output recordings]
//!
//! Producer:  ws://<host>:<port>/ws
//! Viewers:   ws://<host>:<port>/view
//! Status:    http://<host>:<port>/

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use camstream::{RelayServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "camstream-relay")]
#[command(about = "Relay a live camera stream to viewers and record it", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Directory for recordings
    #[arg(long, default_value = "recordings")]
    output: String,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Per-viewer write deadline in milliseconds
    #[arg(long, default_value_t = 2000)]
    write_timeout_ms: u64,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = ServerConfig::with_addr(SocketAddr::new(args.bind, args.port))
        .output_dir(&args.output)
        .max_connections(args.max_connections)
        .subscriber_write_timeout(Duration::from_millis(args.write_timeout_ms));

    tracing::info!(
        addr = %config.bind_addr,
        output_dir = %config.output_dir.display(),
        ingest = %config.ingest_path,
        viewer = %config.viewer_path,
        "Starting relay"
    );

    let server = RelayServer::new(config);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Relay failed");
        return Err(e.into());
    }

    tracing::info!("Relay stopped");
    Ok(())
}
