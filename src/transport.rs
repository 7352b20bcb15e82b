//! Transport channel: a single bidirectional streaming connection.
//!
//! The session manager talks to the wire through the [`Transport`] and
//! [`FrameSink`] traits; [`WsTransport`] is the production implementation
//! over tokio-tungstenite. Tests drive the session with an in-memory
//! transport instead.

use crate::{error::TransportError, frames::OutboundFrame};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};

/// Inbound side of an open channel: text frames in peer order, terminated by
/// a close (channel ends) or an error item.
pub type FrameReceiver = mpsc::Receiver<Result<String, TransportError>>;

/// Factory for streaming connections
pub trait Transport: Send + Sync + 'static {
    type Sink: FrameSink;

    /// Open a connection to `url`, presenting `token` as a bearer
    /// credential. Returns the write half and a receiver of inbound frames.
    fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> impl Future<Output = Result<(Self::Sink, FrameReceiver), TransportError>> + Send;
}

/// Write half of an open channel
pub trait FrameSink: Send + 'static {
    /// Send one frame. Fails with [`TransportError::ChannelClosed`] after
    /// `close`.
    fn send(
        &mut self,
        frame: &OutboundFrame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the channel. Idempotent; safe on any exit path.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// WebSocket transport over tokio-tungstenite
pub struct WsTransport {
    connect_timeout: Duration,
    buffer: usize,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            buffer: 256,
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

type WsWriteHalf =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

impl Transport for WsTransport {
    type Sink = WsSink;

    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> Result<(WsSink, FrameReceiver), TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid stream URL: {}", e)))?;
        let bearer = format!("Bearer {}", token)
            .parse()
            .map_err(|e| TransportError::Connect(format!("invalid bearer header: {}", e)))?;
        request.headers_mut().insert("Authorization", bearer);

        let connected = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout("websocket connect".to_string()))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (write, mut read) = connected.0.split();
        let (tx, rx) = mpsc::channel(self.buffer);

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if tx.send(Ok(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("peer closed the websocket");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(other) => {
                        tracing::debug!("ignoring non-text frame: {:?}", other);
                    }
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Io(e.to_string()))).await;
                        break;
                    }
                }
            }
            // Dropping tx ends the receiver, signalling close to the session.
        });

        Ok((
            WsSink {
                write,
                closed: false,
            },
            rx,
        ))
    }
}

/// Write half of a websocket connection
pub struct WsSink {
    write: WsWriteHalf,
    closed: bool,
}

impl FrameSink for WsSink {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        let text = frame
            .to_text()
            .map_err(|e| TransportError::Io(format!("frame encoding failed: {}", e)))?;
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }
}
