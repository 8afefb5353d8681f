//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WsConnector::connect`] validates the URL synchronously, then spawns a
//! socket task that performs the handshake and runs the read pump. Text
//! frames are forwarded verbatim; decoding is the client's job.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use imu_dash_protocol::constants::MAX_FRAME_BYTES;

use crate::transport::{Connector, EventSender, Transport, TransportError, TransportEvent};

/// Creates WebSocket transports to a fixed URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn connect(&self, events: EventSender) -> Result<Box<dyn Transport>, TransportError> {
        let request =
            self.url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::InvalidUrl {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let cancel = CancellationToken::new();
        info!(url = %self.url, "opening telemetry socket");
        runtime.spawn(run_socket(request, events, cancel.clone()));
        Ok(Box::new(WsTransport { cancel }))
    }
}

/// Handle to a socket task. Closing (or dropping) it stops the task, which
/// sends a close frame on the way out.
pub struct WsTransport {
    cancel: CancellationToken,
}

impl Transport for WsTransport {
    fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why the read pump stopped.
#[derive(Debug, PartialEq)]
pub(crate) enum PumpExit {
    /// The transport was released by the client.
    Cancelled,
    /// Close frame or end of stream.
    Closed,
    /// Read error.
    Failed(String),
}

async fn run_socket(request: Request, events: EventSender, cancel: CancellationToken) {
    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(MAX_FRAME_BYTES);
    ws_config.max_frame_size = Some(MAX_FRAME_BYTES);

    let handshake = tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false);
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = handshake => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "telemetry socket handshake failed");
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        },
    };

    if events.send(TransportEvent::Open).await.is_err() {
        return;
    }
    debug!("telemetry socket open");

    let (mut write, read) = ws_stream.split();
    match read_pump(read, &events, &cancel).await {
        PumpExit::Cancelled => {
            let _ = write.send(tungstenite::Message::Close(None)).await;
            debug!("telemetry socket released");
        }
        PumpExit::Closed => {
            let _ = events.send(TransportEvent::Closed).await;
        }
        PumpExit::Failed(reason) => {
            let _ = events.send(TransportEvent::Error(reason)).await;
        }
    }
}

/// Forwards text frames until the stream ends, fails, or `cancel` fires.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: &EventSender,
    cancel: &CancellationToken,
) -> PumpExit
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PumpExit::Cancelled,

            msg = read.next() => match msg {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    trace!(bytes = text.len(), "received frame");
                    let forwarded = tokio::select! {
                        _ = cancel.cancelled() => return PumpExit::Cancelled,
                        sent = events.send(TransportEvent::Message(text.to_string())) => sent,
                    };
                    if forwarded.is_err() {
                        return PumpExit::Cancelled;
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    debug!(frame = ?frame, "received close frame");
                    return PumpExit::Closed;
                }
                Some(Ok(other)) => {
                    trace!(kind = ?message_kind(&other), "ignoring non-text frame");
                }
                Some(Err(e)) => {
                    warn!("telemetry socket read error: {e}");
                    return PumpExit::Failed(e.to_string());
                }
                None => {
                    debug!("telemetry socket stream ended");
                    return PumpExit::Closed;
                }
            },
        }
    }
}

fn message_kind(msg: &tungstenite::Message) -> &'static str {
    match msg {
        tungstenite::Message::Text(_) => "text",
        tungstenite::Message::Binary(_) => "binary",
        tungstenite::Message::Ping(_) => "ping",
        tungstenite::Message::Pong(_) => "pong",
        tungstenite::Message::Close(_) => "close",
        tungstenite::Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    type Frame = Result<tungstenite::Message, tungstenite::Error>;

    fn text(s: &str) -> Frame {
        Ok(tungstenite::Message::Text(s.into()))
    }

    fn drain(rx: &mut mpsc::Receiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn invalid_url_fails_synchronously() {
        let (tx, _rx) = mpsc::channel(4);
        let result = WsConnector::new("definitely not a url").connect(tx);
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn missing_runtime_fails_synchronously() {
        let (tx, _rx) = mpsc::channel(4);
        let result = WsConnector::new("ws://127.0.0.1:9/sensor").connect(tx);
        assert!(matches!(result, Err(TransportError::NoRuntime)));
    }

    #[tokio::test]
    async fn pump_forwards_text_and_skips_other_frames() {
        let (tx, mut rx) = mpsc::channel(16);
        let frames = stream::iter(vec![
            text("{\"a\":1}"),
            Ok(tungstenite::Message::Binary(vec![1, 2, 3].into())),
            Ok(tungstenite::Message::Ping(vec![].into())),
            text("second"),
        ]);

        let exit = read_pump(frames, &tx, &CancellationToken::new()).await;

        assert_eq!(exit, PumpExit::Closed);
        assert_eq!(
            drain(&mut rx),
            vec![
                TransportEvent::Message("{\"a\":1}".into()),
                TransportEvent::Message("second".into()),
            ]
        );
    }

    #[tokio::test]
    async fn pump_stops_on_close_frame() {
        let (tx, mut rx) = mpsc::channel(16);
        let frames = stream::iter(vec![
            Ok(tungstenite::Message::Close(None)),
            text("never delivered"),
        ]);

        let exit = read_pump(frames, &tx, &CancellationToken::new()).await;

        assert_eq!(exit, PumpExit::Closed);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn pump_reports_read_errors() {
        let (tx, _rx) = mpsc::channel(16);
        let frames = stream::iter(vec![Err(tungstenite::Error::ConnectionClosed)]);

        let exit = read_pump(frames, &tx, &CancellationToken::new()).await;

        assert!(matches!(exit, PumpExit::Failed(_)));
    }

    #[tokio::test]
    async fn pump_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            let silent = stream::pending::<Frame>();
            read_pump(silent, &tx, &c).await
        });

        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
        assert_eq!(exit, PumpExit::Cancelled);
    }

    #[tokio::test]
    async fn pump_stops_when_client_releases_channel() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let frames = stream::iter(vec![text("orphan")]).chain(stream::pending());

        let exit = read_pump(Box::pin(frames), &tx, &CancellationToken::new()).await;

        assert_eq!(exit, PumpExit::Cancelled);
    }

    #[tokio::test]
    async fn end_to_end_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(tungstenite::Message::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let (tx, mut rx) = mpsc::channel(16);
        let _transport = WsConnector::new(format!("ws://{addr}/sensor"))
            .connect(tx)
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(Some(ev)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            let done = ev == TransportEvent::Closed;
            seen.push(ev);
            if done {
                break;
            }
        }
        server.await.unwrap();

        assert_eq!(
            seen,
            vec![
                TransportEvent::Open,
                TransportEvent::Message("hello".into()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let _transport = WsConnector::new(format!("ws://{addr}/sensor"))
            .connect(tx)
            .unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("should report")
            .expect("channel open");
        assert!(matches!(ev, TransportEvent::Error(_)));
    }
}
