//! In-memory transport.
//!
//! [`MemoryConnection::pair`] returns the server half, which implements
//! [`Connection`], and a [`MemoryPeer`] that plays the client.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, TransportError, WireFrame};

/// Server half of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<WireFrame>,
    outbound: mpsc::UnboundedSender<WireFrame>,
    is_open: bool,
}

/// Client half of an in-memory connection.
pub struct MemoryPeer {
    outbound: mpsc::UnboundedSender<WireFrame>,
    inbound: mpsc::UnboundedReceiver<WireFrame>,
}

impl MemoryConnection {
    /// Create a connected pair with a generated id.
    #[must_use]
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        Self::pair_with_id(ConnectionId::generate())
    }

    /// Create a connected pair with the given id.
    #[must_use]
    pub fn pair_with_id(id: impl Into<ConnectionId>) -> (MemoryConnection, MemoryPeer) {
        let (to_server, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_server) = mpsc::unbounded_channel();

        let conn = MemoryConnection {
            id: id.into(),
            inbound: from_peer,
            outbound: to_peer,
            is_open: true,
        };
        let peer = MemoryPeer {
            outbound: to_server,
            inbound: from_server,
        };
        (conn, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError> {
        match self.inbound.recv().await {
            Some(WireFrame::Close) => {
                self.is_open = false;
                Ok(Some(WireFrame::Close))
            }
            Some(frame) => Ok(Some(frame)),
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        // The peer may already be gone; closing is still complete.
        let _ = self.outbound.send(WireFrame::Close);
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

impl MemoryPeer {
    /// Send a text frame to the server.
    ///
    /// Returns `false` if the server half has been dropped.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outbound.send(WireFrame::Text(text.into())).is_ok()
    }

    /// Answer a probe.
    pub fn pong(&self) -> bool {
        self.outbound.send(WireFrame::Pong(Vec::new())).is_ok()
    }

    /// Start the close handshake from the client side.
    pub fn close(&self) -> bool {
        self.outbound.send(WireFrame::Close).is_ok()
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` once the server half has been dropped.
    pub async fn recv(&mut self) -> Option<WireFrame> {
        self.inbound.recv().await
    }

    /// Take the next frame from the server if one is queued.
    pub fn try_recv(&mut self) -> Option<WireFrame> {
        self.inbound.try_recv().ok()
    }

    /// Wait for the next text frame, answering probes along the way.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.inbound.recv().await? {
                WireFrame::Text(text) => return Some(text),
                WireFrame::Ping(_) => {
                    self.pong();
                }
                WireFrame::Pong(_) => {}
                WireFrame::Close => return None,
            }
        }
    }

    /// Stop accepting frames from the server, so every later server write fails.
    pub fn stop_reading(&mut self) {
        self.inbound.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_roundtrip() {
        let (mut conn, mut peer) = MemoryConnection::pair_with_id("conn-1");
        assert_eq!(conn.id().as_str(), "conn-1");

        assert!(peer.send_text("hello"));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(WireFrame::Text("hello".into()))
        );

        conn.send(WireFrame::Text("world".into())).await.unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_memory_peer_close() {
        let (mut conn, peer) = MemoryConnection::pair();
        peer.close();

        assert_eq!(conn.recv().await.unwrap(), Some(WireFrame::Close));
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send(WireFrame::Text("late".into())).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_memory_peer_dropped() {
        let (mut conn, peer) = MemoryConnection::pair();
        drop(peer);

        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_reading_fails_writes() {
        let (mut conn, mut peer) = MemoryConnection::pair();
        peer.stop_reading();

        assert!(conn.send(WireFrame::Ping(Vec::new())).await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut conn, mut peer) = MemoryConnection::pair();

        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(peer.try_recv(), Some(WireFrame::Close));
        assert_eq!(peer.try_recv(), None);
    }
}
