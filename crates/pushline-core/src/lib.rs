//! # pushline-core
//!
//! Connection registry, liveness and routing for the Pushline push layer.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - open connections indexed by user identity
//! - **Heartbeat** - per-connection ping/pong liveness state machine
//! - **ActionRouter** - decodes inbound envelopes and dispatches by action
//! - **Dispatcher** - best-effort fan-out to a user's live connections
//! - **Hub** - drives each connection from connect to teardown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Connection │────▶│ ActionRouter │────▶│ Dispatcher  │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        │                                        │
//!        ▼                                        ▼
//! ┌─────────────┐                          ┌─────────────┐
//! │  Heartbeat  │                          │  Registry   │
//! └─────────────┘                          └─────────────┘
//! ```

pub mod dispatcher;
pub mod heartbeat;
pub mod hub;
pub mod identity;
pub mod registry;
pub mod router;

pub use dispatcher::{Delivery, Dispatcher};
pub use heartbeat::{
    Heartbeat, HeartbeatAction, HeartbeatConfig, HeartbeatMonitor, HeartbeatState,
    MIN_HEARTBEAT_INTERVAL,
};
pub use hub::{CloseReason, ConnectionState, Hub, HubConfig, HubObserver, SessionSummary};
pub use identity::{ConnectRequest, IdentityResolver, QueryIdentity};
pub use registry::{Outbox, Recipient, Registry, RegistryStats};
pub use router::{ActionRouter, RouteOutcome};

pub use pushline_protocol::{ActionKind, UserId};
