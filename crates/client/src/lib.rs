//! Self-healing client for a live IMU telemetry feed.
//!
//! [`TelemetryClient`] owns one transport at a time, decodes every frame
//! with [`imu_dash_protocol::decode`], watches for silent links and
//! reconnects with backoff. Consumers only ever see [`ClientState`]
//! snapshots, either by polling [`TelemetryClient::state`] or through
//! listeners and the watch channel.

mod client;
mod listeners;
mod reconnection;
pub mod transport;
mod types;
mod watchdog;
pub mod ws_transport;

pub use client::TelemetryClient;
pub use listeners::{StateCallback, Subscription};
pub use transport::{Connector, EventSender, Transport, TransportError, TransportEvent};
pub use types::{ClientConfig, ClientState, ErrorKind, LinkState, ReconnectConfig};
pub use ws_transport::{WsConnector, WsTransport};
