//! # pushline-transport
//!
//! Transport abstraction layer for the Pushline push layer.
//!
//! This crate provides a unified interface over the channels a client can be
//! connected through:
//!
//! - **WebSocket** - axum WebSocket upgrades, the production transport
//! - **Memory** - an in-process connection pair for tests and embedders
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Connection` trait, allowing the lifecycle
//! manager to be protocol-agnostic.
//!
//! ```rust,ignore
//! use pushline_transport::{Connection, WireFrame};
//!
//! async fn handle_connection(mut conn: Box<dyn Connection>) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, ConnectionId, TransportError, WireFrame};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
