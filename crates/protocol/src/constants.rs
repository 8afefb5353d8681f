use std::time::Duration;

/// Endpoint the sensor bridge serves telemetry on.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/sensor";

/// Maximum accepted frame size in bytes (1 MiB).
///
/// A well-formed sample is a few hundred bytes; anything near this size is
/// garbage and is rejected before parsing.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Maximum gap between decoded samples before the feed is reported stalled.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(3);

/// How often the watchdog checks the staleness window.
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// How long a connection attempt may spend in the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of scalar channels in one sample.
pub const CHANNEL_COUNT: usize = 22;

/// Wire names of every channel, in canonical order.
///
/// This order is shared by [`TelemetrySample::channels`](crate::TelemetrySample::channels)
/// and [`TelemetrySample::try_from_channels`](crate::TelemetrySample::try_from_channels).
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = [
    "accX",
    "accY",
    "accZ",
    "magX",
    "magY",
    "magZ",
    "gyrX",
    "gyrY",
    "gyrZ",
    "liaX",
    "liaY",
    "liaZ",
    "grvX",
    "grvY",
    "grvZ",
    "eulHeading",
    "eulRoll",
    "eulPitch",
    "quaW",
    "quaX",
    "quaY",
    "quaZ",
];
