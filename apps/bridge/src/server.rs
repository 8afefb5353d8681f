//! Telemetry WebSocket server.
//!
//! Accepts any number of dashboards and pushes every published frame to
//! each of them. Inbound frames are read only to notice a close.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use imu_dash_protocol::constants::MAX_FRAME_BYTES;

/// Errors produced by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("no serial port could be opened (tried {0})")]
    NoSerialPort(String),
}

pub struct BridgeServer {
    frames: broadcast::Sender<String>,
    cancel: CancellationToken,
}

impl BridgeServer {
    pub fn new(frames: broadcast::Sender<String>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self { frames, cancel })
    }

    /// Accepts connections on `listener` until cancelled.
    pub async fn run(self: &Arc<Self>, listener: TcpListener) -> Result<(), BridgeError> {
        let local_addr = listener.local_addr()?;
        info!("bridge listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), BridgeError> {
        // Subscribe first so nothing published after the handshake is missed.
        let mut frames = self.frames.subscribe();

        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_BYTES);
        ws_config.max_frame_size = Some(MAX_FRAME_BYTES);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        info!(%peer_addr, "dashboard connected");

        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }

                frame = frames.recv() => match frame {
                    Ok(text) => write.send(Message::Text(text.into())).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%peer_addr, skipped, "dashboard too slow, frames dropped");
                    }
                    Err(RecvError::Closed) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },

                inbound = read.next() => match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => debug!(%peer_addr, "ignoring inbound frame"),
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }

        info!(%peer_addr, "dashboard disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn serve() -> (broadcast::Sender<String>, CancellationToken, String) {
        let (tx, _) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let server = BridgeServer::new(tx.clone(), cancel.clone());
        tokio::spawn(async move { server.run(listener).await });
        (tx, cancel, url)
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return text.as_str().to_owned();
            }
        }
    }

    #[tokio::test]
    async fn every_dashboard_gets_every_frame() {
        let (tx, _cancel, url) = serve().await;
        let (mut a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        // Both connections subscribed before their handshake completed.
        tx.send("one".into()).unwrap();
        tx.send("two".into()).unwrap();

        assert_eq!(next_text(&mut a).await, "one");
        assert_eq!(next_text(&mut a).await, "two");
        assert_eq!(next_text(&mut b).await, "one");
        assert_eq!(next_text(&mut b).await, "two");
    }

    #[tokio::test]
    async fn inbound_frames_are_ignored() {
        let (tx, _cancel, url) = serve().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        ws.send(Message::Text("hello bridge".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send("frame".into()).unwrap();

        assert_eq!(next_text(&mut ws).await, "frame");
    }

    #[tokio::test]
    async fn dashboard_client_decodes_bridge_frames() {
        use imu_dash_client::{ClientConfig, LinkState, TelemetryClient};
        use imu_dash_protocol::{PartialSample, parse_line};

        let (tx, _cancel, url) = serve().await;
        let client = TelemetryClient::websocket(url, ClientConfig::default());
        client.start();

        let mut partial = PartialSample::default();
        assert!(parse_line("acc analog: 1.50 -2.50 980.00", &mut partial));
        let frame = partial.sample().unwrap().to_json();

        // Frames sent before the client connects go nowhere, so keep sending.
        let sample = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let _ = tx.send(frame.clone());
                tokio::time::sleep(Duration::from_millis(20)).await;
                if let Some(sample) = client.state().latest_sample {
                    break sample;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(sample.acceleration.y, -2.5);
        assert_eq!(sample.acceleration.z, 980.0);
        assert_eq!(client.state().link_state, LinkState::Open);
        client.dispose();
    }

    #[tokio::test]
    async fn shutdown_closes_connections() {
        let (_tx, cancel, url) = serve().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap();
        assert!(!matches!(msg, Some(Ok(Message::Text(_)))), "{msg:?}");
    }
}
