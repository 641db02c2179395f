//! Connection lifecycle manager.
//!
//! The [`Hub`] owns the registry, the heartbeat configuration and the action
//! router, and drives each connection through
//! `CONNECTING -> OPEN -> CLOSED`.
//!
//! One task serves one connection. It selects over the heartbeat timer, the
//! connection's outbox and the inbound stream, so frames from a connection
//! are handled strictly in order and the heartbeat state has a single
//! writer.
//!
//! Every transport write is bounded by the heartbeat interval. A peer that
//! stops draining its socket is closed as a write failure, and a peer that
//! misses two probes is dropped without a close handshake.

use crate::dispatcher::Dispatcher;
use crate::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use crate::identity::{ConnectRequest, IdentityResolver, QueryIdentity};
use crate::registry::{Registry, RegistryStats};
use crate::router::{ActionRouter, RouteOutcome};
use pushline_protocol::{codec::MAX_FRAME_SIZE, UserId};
use pushline_transport::{Connection, ConnectionId, TransportError, WireFrame};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Heartbeat settings applied to every connection.
    pub heartbeat: HeartbeatConfig,
    /// Largest inbound text frame routed, in bytes.
    pub max_frame_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Why a connection reached `CLOSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection or the stream ended.
    PeerClosed,
    /// The transport reported a receive error.
    TransportError,
    /// Two consecutive probes went unanswered.
    HeartbeatTimeout,
    /// Writing to the transport failed.
    WriteFailed,
}

impl CloseReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::HeartbeatTimeout => "heartbeat_timeout",
            CloseReason::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a served connection.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// The connection.
    pub connection_id: ConnectionId,
    /// Identity it was registered with.
    pub identity: Option<UserId>,
    /// Why it closed.
    pub reason: CloseReason,
    /// Text frames received.
    pub frames_in: u64,
    /// Text frames written.
    pub frames_out: u64,
    /// Frames discarded as malformed or unknown.
    pub frames_dropped: u64,
}

/// Observer notified as frames are routed.
///
/// Lets the embedding server record metrics without the core depending on
/// a metrics backend.
pub trait HubObserver: Send + Sync {
    /// Called once per routed inbound frame.
    fn on_route(&self, _outcome: &RouteOutcome) {}

    /// Called when a connection reaches `CLOSED`.
    fn on_close(&self, _summary: &SessionSummary) {}
}

struct NoopObserver;

impl HubObserver for NoopObserver {}

/// Runs registry removal exactly once, on the normal path or on drop.
struct Teardown<'a> {
    registry: &'a Registry,
    connection_id: ConnectionId,
    done: bool,
}

impl<'a> Teardown<'a> {
    fn new(registry: &'a Registry, connection_id: ConnectionId) -> Self {
        Self {
            registry,
            connection_id,
            done: false,
        }
    }

    /// Returns `false` if teardown already ran.
    fn run(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        self.registry.unregister(&self.connection_id);
        true
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if self.run() {
            debug!(connection = %self.connection_id, "Teardown ran on drop");
        }
    }
}

/// The connection lifecycle manager.
pub struct Hub {
    registry: Arc<Registry>,
    router: ActionRouter,
    resolver: Arc<dyn IdentityResolver>,
    observer: Arc<dyn HubObserver>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub that reads identities from the `userId` query parameter.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self::with_resolver(config, Arc::new(QueryIdentity::default()))
    }

    /// Create a hub with a custom identity resolver.
    #[must_use]
    pub fn with_resolver(config: HubConfig, resolver: Arc<dyn IdentityResolver>) -> Self {
        if !resolver.is_verified() {
            warn!(
                resolver = resolver.name(),
                "Connection identities are not verified; any client can claim any user id"
            );
        }

        let registry = Arc::new(Registry::new());
        let router = ActionRouter::new(Dispatcher::new(registry.clone()))
            .with_max_frame_size(config.max_frame_size);

        info!(
            heartbeat_interval_ms = config.heartbeat.effective_interval().as_millis() as u64,
            max_frame_size = config.max_frame_size,
            resolver = resolver.name(),
            "Creating hub"
        );

        Self {
            registry,
            router,
            resolver,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    /// Attach an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn HubObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The broadcast dispatcher, for server-originated deliveries.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        self.router.dispatcher()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Resolve the identity of a connection request (`CONNECTING`).
    ///
    /// Absent or malformed identities resolve to `None`; the connection is
    /// still accepted.
    #[must_use]
    pub fn resolve_identity(&self, request: &ConnectRequest) -> Option<UserId> {
        self.resolver.resolve(request)
    }

    /// Serve an accepted connection until it closes.
    ///
    /// Registers the connection, starts its heartbeat and routes its frames
    /// (`OPEN`), then unregisters it and stops the heartbeat (`CLOSED`).
    pub async fn serve<C>(&self, mut conn: C, identity: Option<UserId>) -> SessionSummary
    where
        C: Connection,
    {
        let connection_id = conn.id().clone();
        let mut state = ConnectionState::Connecting;
        debug!(connection = %connection_id, state = ?state, "Accepted connection");

        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();
        self.registry
            .register(connection_id.clone(), identity.clone(), outbox);
        let mut teardown = Teardown::new(&self.registry, connection_id.clone());
        let mut heartbeat = HeartbeatMonitor::start(&self.config.heartbeat);
        let write_timeout = self.config.heartbeat.effective_interval();
        state = ConnectionState::Open;

        info!(
            connection = %connection_id,
            user = identity.as_ref().map(UserId::as_str),
            remote = conn.remote_addr().as_deref(),
            state = ?state,
            "Client connected"
        );

        let mut frames_in = 0u64;
        let mut frames_out = 0u64;
        let mut frames_dropped = 0u64;

        let reason = loop {
            tokio::select! {
                biased;

                action = heartbeat.tick() => match action {
                    HeartbeatAction::Probe => {
                        debug!(connection = %connection_id, "Sending ping");
                        if let Err(e) = write(&mut conn, WireFrame::Ping(Vec::new()), write_timeout).await {
                            warn!(connection = %connection_id, error = %e, "Failed to send ping");
                            break CloseReason::WriteFailed;
                        }
                    }
                    HeartbeatAction::Terminate => {
                        warn!(
                            connection = %connection_id,
                            user = identity.as_ref().map(UserId::as_str),
                            "Terminating inactive connection"
                        );
                        break CloseReason::HeartbeatTimeout;
                    }
                },

                Some(text) = outbox_rx.recv() => {
                    if let Err(e) = write(&mut conn, WireFrame::Text(text), write_timeout).await {
                        warn!(connection = %connection_id, error = %e, "Write failed");
                        break CloseReason::WriteFailed;
                    }
                    frames_out += 1;
                }

                frame = conn.recv() => match frame {
                    Ok(Some(WireFrame::Text(text))) => {
                        frames_in += 1;
                        let outcome = self.router.on_frame(&connection_id, identity.as_ref(), &text);
                        if matches!(outcome, RouteOutcome::Malformed | RouteOutcome::UnknownAction(_)) {
                            frames_dropped += 1;
                        }
                        self.observer.on_route(&outcome);
                    }
                    Ok(Some(WireFrame::Pong(_))) => {
                        debug!(connection = %connection_id, "Received pong");
                        heartbeat.acknowledge();
                    }
                    Ok(Some(WireFrame::Ping(data))) => {
                        if let Err(e) = write(&mut conn, WireFrame::Pong(data), write_timeout).await {
                            warn!(connection = %connection_id, error = %e, "Failed to send pong");
                            break CloseReason::WriteFailed;
                        }
                    }
                    Ok(Some(WireFrame::Close)) | Ok(None) => break CloseReason::PeerClosed,
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Transport error");
                        break CloseReason::TransportError;
                    }
                },
            }
        };

        // Unregister first, then stop the heartbeat and drop the transport.
        teardown.run();
        drop(heartbeat);
        drop(conn);
        state = ConnectionState::Closed;

        info!(
            connection = %connection_id,
            user = identity.as_ref().map(UserId::as_str),
            reason = %reason,
            state = ?state,
            "Client disconnected"
        );

        let summary = SessionSummary {
            connection_id,
            identity,
            reason,
            frames_in,
            frames_out,
            frames_dropped,
        };
        self.observer.on_close(&summary);
        summary
    }
}

/// Write one frame, failing if the transport does not accept it within `limit`.
async fn write<C>(conn: &mut C, frame: WireFrame, limit: Duration) -> Result<(), TransportError>
where
    C: Connection,
{
    match time::timeout(limit, conn.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}
