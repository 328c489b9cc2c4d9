//! Capture client
//!
//! Run with: camstream-client [--addr localhost:8080] [--device /dev/video0]
//!
//! Reads encoded video from the device (or stdin with `--device -`) and
//! streams it to the relay, reconnecting until interrupted:
//!
//!   ffmpeg -f v4l2 -i /dev/video0 -c:v libx264 -f h264 - | camstream-client --device -

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use camstream::client::{ClientConfig, DeviceBackend, WsConnector};
use camstream::{CaptureService, LinkEvent, StreamConfig};

#[derive(Parser, Debug)]
#[command(name = "camstream-client")]
#[command(about = "Stream a camera to a camstream relay", long_about = None)]
struct Args {
    /// Relay address (host:port)
    #[arg(long, default_value = "localhost:8080")]
    addr: String,

    /// Frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Bit rate in bits per second
    #[arg(long, default_value_t = 1_000_000)]
    bitrate: u32,

    /// Capture device, file, or `-` for stdin
    #[arg(long, default_value = "")]
    device: String,

    /// Maximum frame size in bytes
    #[arg(long, default_value_t = camstream::client::source::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Verbose logging and transmit statistics
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

    let client_config = ClientConfig::default().debug(args.debug);
    let service = CaptureService::new(
        Arc::new(DeviceBackend::new().chunk_size(args.chunk_size)),
        Arc::new(WsConnector::new(client_config.connect_timeout)),
        client_config,
    );

    if args.list_devices {
        for (i, device) in service.list_devices()?.iter().enumerate() {
            println!("[{}] {} ({})", i, device.label, device.kind);
        }
        return Ok(());
    }

    let stream = StreamConfig::for_address(&args.addr)
        .resolution(args.width, args.height)
        .frame_rate(args.fps)
        .bit_rate(args.bitrate)
        .device(args.device);

    let mut events = service.start_capture(stream).await?;
    let mut booted = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if booted {
                    tracing::info!("Interrupted, shutting down");
                } else {
                    tracing::info!("Interrupted on boot");
                }
                break;
            }
            event = events.recv() => match event {
                Some(LinkEvent::Connected { attempt }) => {
                    if !booted {
                        booted = true;
                        tracing::info!("Booted");
                    } else {
                        tracing::info!(attempt, "Reconnected");
                    }
                }
                Some(LinkEvent::Terminated(end)) => {
                    tracing::info!(reason = ?end, "Capture session ended");
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    // Already stopped if the session terminated on its own
    if let Err(e) = service.stop_capture().await {
        tracing::debug!(error = %e, "Nothing to stop");
    }

    Ok(())
}
