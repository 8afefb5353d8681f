//! IMU bridge entry point.
//!
//! Reads the sensor board over serial (or replays a capture of it) and
//! serves each accumulated sample to dashboards over WebSocket.

mod server;
mod source;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::server::BridgeServer;
use crate::source::{DEFAULT_BAUD, REOPEN_DELAY, ReplaySource, SerialSource};

/// Frames buffered per dashboard before a slow one starts losing frames.
const FRAME_BUFFER: usize = 64;

/// Serial-to-WebSocket bridge for an IMU sensor board.
#[derive(Parser, Debug)]
#[command(name = "imu-bridge", version, about)]
struct Cli {
    /// Address to serve telemetry on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Serial device to read; repeat to try several in order. Ports are
    /// discovered when none is given.
    #[arg(long = "device")]
    devices: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Replay a capture of the board's serial output instead of a device.
    #[arg(long, conflicts_with = "devices")]
    replay: Option<PathBuf>,

    /// Pause between replayed frames, in milliseconds.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Play the capture once instead of looping.
    #[arg(long, requires = "replay")]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting imu-bridge");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))?;

    tracing::info!("bridge shut down cleanly");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let listener = TcpListener::bind(cli.listen).await?;
    let (frames, _) = broadcast::channel(FRAME_BUFFER);
    let cancel = CancellationToken::new();

    let producer = {
        let frames = frames.clone();
        let cancel = cancel.clone();
        match cli.replay {
            Some(path) => {
                let replay = ReplaySource {
                    path,
                    interval: Duration::from_millis(cli.interval_ms),
                    repeat: !cli.once,
                };
                tokio::spawn(async move {
                    if let Err(e) = replay.run(frames, cancel).await {
                        tracing::error!("replay failed: {e}");
                    }
                })
            }
            None => {
                let serial = SerialSource {
                    devices: cli.devices,
                    baud: cli.baud,
                    reopen_delay: REOPEN_DELAY,
                };
                tokio::spawn(async move { serial.run(frames, cancel).await })
            }
        }
    };

    let server = BridgeServer::new(frames, cancel.clone());
    let serving = tokio::spawn(async move { server.run(listener).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    cancel.cancel();

    serving.await??;
    let _ = producer.await;
    Ok(())
}
