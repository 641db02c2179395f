//! Connection handlers for Pushline server.
//!
//! This module accepts WebSocket upgrades, resolves the connecting identity
//! and hands each connection to the hub.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MetricsObserver};
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, RawQuery, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use pushline_core::{ConnectRequest, Hub, QueryIdentity};
use pushline_transport::WebSocketConnection;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The connection hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(QueryIdentity::new(config.identity.query_param.clone()));
        let hub = Hub::with_resolver(config.hub_config(), resolver)
            .with_observer(Arc::new(MetricsObserver));

        Self { hub, config }
    }
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    let mut app = Router::new().route(&ws_path, get(ws_handler));
    if ws_path != "/" {
        app = app.route("/", get(ws_handler));
    }

    app.route("/health", get(health_handler)).with_state(state)
}

/// Run the HTTP/WebSocket server until interrupted.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let ws_path = state.config.transport.websocket_path.clone();

    let listener = TcpListener::bind(addr).await?;

    info!("Pushline server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    serve(listener, build_app(state), shutdown_signal()).await
}

/// Serve `app` on `listener` until `shutdown` completes.
async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "users": stats.users,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let request = ConnectRequest {
        query,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };
    let identity = state.hub.resolve_identity(&request);

    debug!(remote = %addr, user = identity.as_ref().map(|id| id.as_str()), "Upgrade request");

    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| async move {
            let _metrics_guard = ConnectionMetricsGuard::new();
            let conn = WebSocketConnection::new(socket, Some(addr));
            state.hub.serve(conn, identity).await;
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use pushline_core::UserId;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time;
    use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (SocketAddr, Arc<AppState>) {
        start_with(Config::default()).await
    }

    async fn start_with(config: Config) -> (SocketAddr, Arc<AppState>) {
        let state = Arc::new(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = build_app(state.clone());
        tokio::spawn(serve(listener, app, std::future::pending()));

        (addr, state)
    }

    async fn connect(addr: SocketAddr, path: &str) -> Client {
        let (ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
        ws
    }

    async fn wait_for_connections(state: &AppState, count: usize) {
        time::timeout(Duration::from_secs(5), async {
            while state.hub.stats().connections < count {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn next_json(ws: &mut Client) -> Value {
        time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended: {:?}", other),
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_message_roundtrip_over_websocket() {
        let (addr, state) = start().await;
        let mut alice = connect(addr, "/ws?userId=1").await;
        let mut bob = connect(addr, "/?userId=2").await;
        wait_for_connections(&state, 2).await;

        let frame = json!({
            "action": "MESSAGE",
            "data": {"sendeeId": 2, "conversationId": 7, "text": "hello"}
        });
        alice.send(Message::Text(frame.to_string())).await.unwrap();

        let value = next_json(&mut bob).await;
        assert_eq!(value["action"], "message");
        assert_eq!(value["data"]["type"], "MESSAGE");
        assert_eq!(value["data"]["userId"], "1");
        assert_eq!(value["data"]["conversationId"], 7);
        assert_eq!(value["data"]["text"], "hello");

        alice.close(None).await.unwrap();
        time::timeout(Duration::from_secs(5), async {
            while state.hub.registry().connection_count_for(&UserId::new("1")) > 0 {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_anonymous_connection_survives_malformed_frames() {
        let (addr, state) = start().await;
        let mut target = connect(addr, "/ws?userId=9").await;
        let mut anon = connect(addr, "/ws").await;
        wait_for_connections(&state, 2).await;
        assert_eq!(state.hub.stats().identified, 1);

        anon.send(Message::Text("not json at all".into())).await.unwrap();
        anon.send(Message::Text(r#"{"action":"WAVE","data":{}}"#.into()))
            .await
            .unwrap();
        anon.send(Message::Text(r#"{"action":"LIKE","data":{"userId":9}}"#.into()))
            .await
            .unwrap();

        let value = next_json(&mut target).await;
        assert_eq!(value["action"], "notification");
        assert_eq!(value["data"]["type"], "LIKE");
        assert_eq!(value["data"]["userId"], Value::Null);
        assert_eq!(value["data"]["message"], "broadcast notification");
        assert_eq!(state.hub.stats().connections, 2);
    }

    #[tokio::test]
    async fn test_pong_keeps_websocket_registered() {
        let mut config = Config::default();
        config.heartbeat.interval_ms = 100;
        let (addr, state) = start_with(config).await;

        let mut responsive = connect(addr, "/ws?userId=1").await;
        let _silent = connect(addr, "/ws?userId=2").await;
        wait_for_connections(&state, 2).await;

        // Reading the stream lets the client answer each ping with a pong
        let reader = tokio::spawn(async move {
            let mut pings = 0;
            while let Some(Ok(message)) = responsive.next().await {
                if message.is_ping() {
                    pings += 1;
                }
            }
            pings
        });

        time::sleep(Duration::from_millis(700)).await;

        assert_eq!(state.hub.registry().connection_count_for(&UserId::new("1")), 1);
        assert_eq!(state.hub.registry().connection_count_for(&UserId::new("2")), 0);

        reader.abort();
        let _ = reader.await;
    }

    #[tokio::test]
    async fn test_health_handler() {
        let state = Arc::new(AppState::new(Config::default()));
        let response = health_handler(State(state)).await.into_response();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["connections"], 0);
        assert_eq!(value["users"], 0);
    }
}
