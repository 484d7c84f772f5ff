//! WebSocket transport using `tokio-tungstenite`.
//!
//! Every Rollcall message is one JSON text frame. The stream is split so
//! a connection task can wait for the next client frame while another
//! branch of its `select!` pushes display codes out.
//!
//! Accepting is two steps. [`WsListener::accept`] only takes the TCP
//! connection; the WebSocket upgrade happens in
//! [`PendingConnection::upgrade`], on the connection's own task and under
//! a deadline, so a peer that never finishes its handshake holds up
//! nobody else.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    /// The peer didn't complete the upgrade in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// The peer sent a binary frame that isn't UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NotText,
}

/// Opaque identifier for a connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts WebSocket connections on a TCP port.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Binds to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP client. Nothing is read from it yet.
    pub async fn accept(&self) -> Result<PendingConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingConnection { stream, addr })
    }
}

/// A TCP connection that hasn't been upgraded to WebSocket yet.
pub struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the WebSocket upgrade, giving up after `limit`.
    ///
    /// # Errors
    /// [`TransportError::HandshakeTimeout`] if the peer is too slow,
    /// [`TransportError::Handshake`] if it isn't speaking WebSocket.
    pub async fn upgrade(self, limit: Duration) -> Result<WsConnection, TransportError> {
        let ws = tokio::time::timeout(limit, tokio_tungstenite::accept_async(self.stream))
            .await
            .map_err(|_| TransportError::HandshakeTimeout(limit))?
            .map_err(TransportError::Handshake)?;

        let id = ConnectionId::next();
        tracing::debug!(%id, addr = %self.addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WsConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection carrying text frames.
pub struct WsConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WsConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends one text frame.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Receives the next frame as text.
    ///
    /// Binary frames are accepted if they hold UTF-8. Control frames are
    /// skipped. Returns `Ok(None)` when the peer closes cleanly.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no frame.
    pub async fn recv_text(&self) -> Result<Option<String>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|_| TransportError::NotText);
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
    }

    /// Sends a close frame.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(TransportError::SendFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }

    #[tokio::test]
    async fn test_text_frame_round_trip() {
        let listener = WsListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let pending = listener.accept().await.unwrap();
            let conn = pending.upgrade(Duration::from_secs(5)).await.unwrap();
            let text = conn.recv_text().await.unwrap().unwrap();
            conn.send_text(format!("echo:{text}")).await.unwrap();
            conn.recv_text().await.unwrap()
        });

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        client.send(Message::Text("hi".into())).await.unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply.into_text().unwrap().as_str(), "echo:hi");

        client.close(None).await.unwrap();
        assert_eq!(server.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upgrade_silent_peer_times_out() {
        let listener = WsListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _silent = TcpStream::connect(addr).await.unwrap();
        let pending = listener.accept().await.unwrap();
        let result = pending.upgrade(Duration::from_millis(50)).await;

        assert!(matches!(result, Err(TransportError::HandshakeTimeout(_))));
    }
}
