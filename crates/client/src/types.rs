//! Public types for the telemetry client.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use imu_dash_protocol::TelemetrySample;
use imu_dash_protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_STALENESS_WINDOW, DEFAULT_WATCHDOG_PERIOD,
};

/// The client's own assessment of feed health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// A transport has been requested and the handshake is in progress.
    Connecting,
    /// Handshake done and samples are arriving.
    Open,
    /// Transport still up, but no decoded sample within the staleness window.
    Stalled,
    /// Transport gone; a reconnect is scheduled.
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Stalled => "stalled",
            Self::Closed => "closed",
        })
    }
}

/// Last failure observed by the client. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connector refused to create a transport.
    TransportCreationFailed,
    /// The transport reported an error (handshake or read failure).
    TransportError,
    /// The transport closed.
    TransportClosed,
    /// A frame failed to decode; the previous sample stays current.
    DecodeFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TransportCreationFailed => "failed to create connection",
            Self::TransportError => "connection error",
            Self::TransportClosed => "connection closed",
            Self::DecodeFailure => "invalid telemetry frame",
        })
    }
}

/// Read-only snapshot of everything a renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub link_state: LinkState,
    /// Last successfully decoded sample. Survives decode failures,
    /// stalls and reconnects.
    pub latest_sample: Option<TelemetrySample>,
    pub last_error: Option<ErrorKind>,
    /// Local receipt time of `latest_sample`.
    pub last_sample_at: Option<Instant>,
    /// Consecutive connection attempts that ended in [`LinkState::Closed`]
    /// since the last successful open.
    pub attempt: u32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            link_state: LinkState::Connecting,
            latest_sample: None,
            last_error: None,
            last_sample_at: None,
            attempt: 0,
        }
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Relative jitter applied to each delay, in `[0, 1)`.
    pub jitter_ratio: f64,
}

/// Floor for any computed delay.
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

impl ReconnectConfig {
    /// A constant delay with no growth and no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            jitter_ratio: 0.0,
        }
    }

    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * self.jitter_ratio.clamp(0.0, 0.99);
        let offset = if jitter > 0.0 { unit_noise() } else { 0.0 };
        let with_jitter = (capped + jitter * offset).max(MIN_RECONNECT_DELAY.as_secs_f64());
        Duration::from_secs_f64(with_jitter)
    }
}

/// Uniform noise in `[-1.0, 1.0)`.
fn unit_noise() -> f64 {
    rand::thread_rng().gen_range(-1.0..1.0)
}

/// Tunables of a [`TelemetryClient`](crate::TelemetryClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum gap between decoded samples before the link is `Stalled`.
    pub staleness_window: Duration,
    /// How often the watchdog checks the window.
    pub watchdog_period: Duration,
    /// How long a transport may stay in the handshake before it is
    /// abandoned as a [`ErrorKind::TransportError`].
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            staleness_window: DEFAULT_STALENESS_WINDOW,
            watchdog_period: DEFAULT_WATCHDOG_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}
