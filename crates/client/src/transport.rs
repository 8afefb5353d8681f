//! The seam between the client and whatever carries the frames.
//!
//! A [`Connector`] creates one [`Transport`] per connection attempt. The
//! transport reports its lifecycle through the event channel handed to
//! [`Connector::connect`]; the client owns both ends and drops the receiver
//! when it releases the transport, so a released transport can never reach
//! the client again.

use tokio::sync::mpsc;

/// Lifecycle events a transport reports to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake complete.
    Open,
    /// One inbound text frame.
    Message(String),
    /// Transport-level failure. The transport is dead after this.
    Error(String),
    /// The peer closed or the stream ended.
    Closed,
}

/// Sending half of a transport's event channel.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Errors raised synchronously while creating a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no async runtime available")]
    NoRuntime,

    #[error("{0}")]
    Other(String),
}

/// A live connection owned exclusively by the client.
pub trait Transport: Send {
    /// Releases the connection. Must be idempotent and must not emit
    /// further events the client is expected to act on.
    fn close(&mut self);
}

/// Factory for transports.
pub trait Connector: Send + Sync + 'static {
    /// Starts a new connection that reports through `events`.
    ///
    /// Returning an error means no transport exists; the client records
    /// [`ErrorKind::TransportCreationFailed`](crate::ErrorKind::TransportCreationFailed)
    /// and retries later.
    fn connect(&self, events: EventSender) -> Result<Box<dyn Transport>, TransportError>;
}
