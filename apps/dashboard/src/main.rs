//! IMU dashboard entry point.

mod app;
mod config;
mod render;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Live terminal view of an IMU telemetry feed.
#[derive(Parser, Debug)]
#[command(name = "imu-dash", version, about)]
struct Cli {
    /// WebSocket endpoint of the sensor bridge.
    #[arg(long)]
    url: Option<String>,

    /// Configuration file (defaults to ~/.config/imu-dash/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decimal places for vector and angle readings.
    #[arg(long)]
    precision: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they do not interleave with the table on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting imu-dash");

    let mut config = config::DashboardConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(precision) = cli.precision {
        config.precision = precision;
    }
    config.validate()?;
    tracing::info!(url = %config.url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("dashboard shut down cleanly");
    Ok(())
}
