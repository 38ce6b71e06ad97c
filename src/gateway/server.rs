//! Local listening surface.
//!
//! One WebSocket endpoint, unauthenticated, distinguished only by the
//! `channel` query parameter. Admission tags the connection with its
//! lowercased channel, ensures the channel bridge exists, and registers the
//! connection for fan-out. A connection without a channel, or whose bridge
//! cannot be established, is closed with no payload exchanged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::connections::ConnectionRegistry;
use crate::gateway::inbound;
use crate::upstream::BridgeRegistry;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Composition root: owns the connection registry and the bridge registry.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub bridges: Arc<BridgeRegistry>,
}

impl RelayState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let connections = Arc::new(ConnectionRegistry::new());
        let bridges = Arc::new(BridgeRegistry::new(
            Arc::clone(&config),
            Arc::clone(&connections),
        ));
        Self {
            config,
            connections,
            bridges,
        }
    }
}

/// Build the gateway router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Bind the listener and serve until a shutdown signal arrives.
pub async fn serve(state: RelayState, port: u16) -> Result<(), GatewayError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    info!(%addr, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    // Canonicalize at the entry point; the tag never changes afterwards.
    let channel = params
        .get("channel")
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, channel))
}

async fn handle_socket(mut socket: WebSocket, state: RelayState, channel: Option<String>) {
    let Some(channel) = channel else {
        warn!("connection rejected: no channel supplied");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    if let Err(e) = state.bridges.ensure_bridge(&channel).await {
        warn!(channel = %channel, error = %e, "closing connection: channel bridge unavailable");
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Arc<str>>();
    let id = state.connections.register(&channel, outbound_tx).await;
    info!(channel = %channel, connection = %id, "client connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if sink.send(Message::Text(json.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                inbound::process_frame(&state, &channel, text.as_str()).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.connections.unregister(&channel, id).await;
    writer.abort();
    info!(channel = %channel, connection = %id, "client disconnected");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::util::ServiceExt;
    use url::Url;

    use super::*;

    fn test_state() -> RelayState {
        RelayState::new(Config {
            bot_username: "relaybot".to_string(),
            bot_token: SecretString::from("oauth:test".to_string()),
            upstream_url: Url::parse("ws://127.0.0.1:1").unwrap(),
        })
    }

    #[tokio::test]
    async fn test_healthz_responds_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_requires_websocket_upgrade() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?channel=alpha")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }
}
