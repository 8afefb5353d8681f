//! Dashboard configuration.
//!
//! Stored as TOML at `~/.config/imu-dash/config.toml` unless `--config`
//! names another file. Every key is optional; durations are milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use imu_dash_client::{ClientConfig, ReconnectConfig};
use imu_dash_protocol::constants::DEFAULT_WS_URL;

/// Largest precision the renderer accepts.
const MAX_PRECISION: usize = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// WebSocket endpoint of the sensor bridge.
    pub url: String,
    /// Decimal places for vector and angle readings.
    pub precision: usize,
    /// Decimal places for quaternion components.
    pub quaternion_precision: usize,
    /// Minimum time between two printed tables.
    pub refresh_ms: u64,
    pub staleness_window_ms: u64,
    pub watchdog_period_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub backoff_factor: f64,
    pub jitter_ratio: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            url: DEFAULT_WS_URL.into(),
            precision: 2,
            quaternion_precision: 4,
            refresh_ms: 200,
            staleness_window_ms: millis(client.staleness_window),
            watchdog_period_ms: millis(client.watchdog_period),
            connect_timeout_ms: millis(client.connect_timeout),
            reconnect_initial_ms: millis(client.reconnect.initial_delay),
            reconnect_max_ms: millis(client.reconnect.max_delay),
            backoff_factor: client.reconnect.backoff_factor,
            jitter_ratio: client.reconnect.jitter_ratio,
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl DashboardConfig {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields defaults; an explicitly
    /// named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("config file {} not found", path.display());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    /// Rejects values the client or renderer cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!("url must not be empty");
        }
        if self.precision > MAX_PRECISION || self.quaternion_precision > MAX_PRECISION {
            anyhow::bail!("precision must be at most {MAX_PRECISION}");
        }
        if self.staleness_window_ms == 0
            || self.watchdog_period_ms == 0
            || self.connect_timeout_ms == 0
        {
            anyhow::bail!(
                "staleness_window_ms, watchdog_period_ms and connect_timeout_ms must be positive"
            );
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            anyhow::bail!("reconnect_max_ms must not be below reconnect_initial_ms");
        }
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            anyhow::bail!("backoff_factor must be a finite number >= 1.0");
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            anyhow::bail!("jitter_ratio must be in [0, 1)");
        }
        Ok(())
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            staleness_window: Duration::from_millis(self.staleness_window_ms),
            watchdog_period: Duration::from_millis(self.watchdog_period_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect_initial_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                backoff_factor: self.backoff_factor,
                jitter_ratio: self.jitter_ratio,
            },
        }
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("imu-dash")
        .join("config.toml")
}
