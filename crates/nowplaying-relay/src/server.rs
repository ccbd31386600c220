//! HTTP and WebSocket surface.

use crate::bridge::{CommandBridge, ForwardReceipt};
use crate::config::Config;
use crate::connection::{Connection, Outbound};
use crate::error::{BridgeError, ConfigError, RelayError};
use crate::hub::{Hub, HubStatus};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue},
    response::Response,
    routing::{get, post},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use nowplaying_core::{Role, SharedSecret};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the shared secret, on both the socket and the bridge.
pub const API_TOKEN_HEADER: &str = "x-api-token";

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub bridge: Arc<CommandBridge>,
    /// Attached on behalf of browsers hitting `/control`.
    control_secret: SharedSecret,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let hub = Arc::new(Hub::new(config.api_secret.clone()));
        let bridge = Arc::new(CommandBridge::new(
            hub.clone(),
            config.api_secret.clone(),
            config.action_policy.clone(),
        ));
        Self {
            hub,
            bridge,
            control_secret: config.api_secret.clone(),
        }
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/ws/nowplaying", get(nowplaying_ws))
        .route("/forward_to_bot/{action}", post(forward_to_bot))
        .route("/control/{action}", post(control_action))
        .route("/status", get(status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the browser client. An empty origin list allows any origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).map_err(|_| ConfigError::Origin(o.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(values)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    if config.uses_default_secret() {
        tracing::warn!("Using the default API secret; set API_SECRET in production");
    }
    let cors = cors_layer(&config.allowed_origins)?;
    let app = router(AppState::new(&config), cors);

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!("Listening on http://{}", config.listen);
    axum::serve(listener, app).await?;
    Ok(())
}

fn api_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_TOKEN_HEADER)?.to_str().ok()
}

/// GET /ws/nowplaying
async fn nowplaying_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let credential = api_token(&headers).map(str::to_owned);
    ws.on_upgrade(move |socket| handle_socket(socket, credential, state.hub))
}

async fn handle_socket(socket: WebSocket, credential: Option<String>, hub: Arc<Hub>) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound) = Connection::open();
    let role = hub.accept(&conn, credential.as_deref()).await;

    loop {
        tokio::select! {
            // Incoming frame from the peer
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!(conn_id = conn.id(), %role, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => handle_text(&hub, &conn, role, text.as_str()).await,
                    Message::Close(_) => break,
                    Message::Binary(_) => {
                        tracing::debug!(conn_id = conn.id(), %role, "Ignoring binary frame");
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }

            // Frame queued by the hub or the bridge
            out = outbound.recv() => {
                if !write_outbound(&mut sink, out).await {
                    break;
                }
            }
        }
    }

    hub.release(&conn).await;
    tracing::debug!(conn_id = conn.id(), %role, "Connection closed");
}

async fn handle_text(hub: &Hub, conn: &Connection, role: Role, text: &str) {
    let result = match role {
        Role::Producer => hub.on_producer_text(conn, text).await.map(drop),
        Role::Subscriber => hub.on_subscriber_text(text).await.map(drop),
    };
    match result {
        Ok(()) => {}
        Err(RelayError::MalformedMessage(e)) => {
            tracing::warn!(conn_id = conn.id(), %role, "Invalid message: {}", e);
        }
        Err(e) => {
            tracing::warn!(conn_id = conn.id(), %role, "Error handling message: {}", e);
        }
    }
}

/// Write one queued frame. Returns false once the socket should stop.
async fn write_outbound(sink: &mut SplitSink<WebSocket, Message>, out: Option<Outbound>) -> bool {
    match out {
        Some(Outbound::Text(text)) => sink.send(Message::Text(text.as_ref().into())).await.is_ok(),
        Some(Outbound::Close) | None => {
            let _ = sink.send(Message::Close(None)).await;
            false
        }
    }
}

/// POST /forward_to_bot/{action}
async fn forward_to_bot(
    State(state): State<AppState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ForwardReceipt>, BridgeError> {
    tracing::info!(%action, "Command received");
    state
        .bridge
        .forward_body(&action, &body, api_token(&headers))
        .await
        .map(Json)
}

/// POST /control/{action} - browser-facing; the relay supplies the secret.
async fn control_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    body: Bytes,
) -> Result<Json<ForwardReceipt>, BridgeError> {
    tracing::info!(%action, "Control command received");
    state
        .bridge
        .forward_body(&action, &body, Some(state.control_secret.expose()))
        .await
        .map(Json)
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<HubStatus> {
    Json(state.hub.status().await)
}
