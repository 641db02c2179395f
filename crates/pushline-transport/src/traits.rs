//! Transport abstraction traits for Pushline.
//!
//! These traits define the interface that all transport implementations must provide,
//! allowing the lifecycle manager to be transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A frame as seen at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A text data frame carrying an envelope.
    Text(String),
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Liveness acknowledgment.
    Pong(Vec<u8>),
    /// Close handshake.
    Close,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The transport did not accept a frame in time.
    #[error("Send timed out")]
    Timeout,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// An active connection over a transport.
///
/// Connections handle the bidirectional flow of frames between
/// the server and a single client.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame from the connection.
    ///
    /// Returns `None` once the stream has ended. A close frame from the peer
    /// may surface as [`WireFrame::Close`] or directly as `None`; callers
    /// treat both as a clean close.
    async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError>;

    /// Send a frame to the connection.
    async fn send(&mut self, frame: WireFrame) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    ///
    /// Closing an already closed connection is a no-op. Dropping a connection
    /// without calling this aborts it without a close handshake.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
