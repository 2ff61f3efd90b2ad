//! Server core: shared state, the WebSocket store endpoint, and the HTTP
//! reset and health endpoints.
//!
//! A client connects to `/ws`, authenticates with a bearer token, and then
//! issues store requests. Every request runs under the owner the token maps
//! to, so a client can neither read nor change another owner's rows.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use taskday_proto::codec;
use taskday_proto::protocol::{StoreMessage, StoreReply};
use taskday_proto::task::OwnerId;
use tokio::sync::mpsc;

use crate::auth::TokenAuth;
use crate::config::ServerConfig;
use crate::reset;
use crate::store::RecordStore;

/// Default maximum accepted request frame size in bytes (64 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared server state.
pub struct ServerState {
    /// The record tables all connections operate on.
    pub store: Arc<RecordStore>,
    auth: TokenAuth,
    max_payload_size: usize,
    /// When set, `POST /reset` requires `Authorization: Bearer <token>`.
    reset_token: Option<String>,
}

impl ServerState {
    /// Creates server state with the default frame limit and an open reset
    /// endpoint.
    #[must_use]
    pub const fn new(store: Arc<RecordStore>, auth: TokenAuth) -> Self {
        Self {
            store,
            auth,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            reset_token: None,
        }
    }

    /// Creates server state from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &ServerConfig, store: Arc<RecordStore>) -> Self {
        Self {
            store,
            auth: TokenAuth::from_users(&config.users),
            max_payload_size: config.max_payload_size,
            reset_token: config.reset_token.clone(),
        }
    }

    #[must_use]
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    #[must_use]
    pub fn with_reset_token(mut self, token: impl Into<String>) -> Self {
        self.reset_token = Some(token.into());
        self
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for an `Authenticate` message.
/// 2. Resolve the token; on failure send `Error` and close.
/// 3. Send `Authenticated` with the owner id.
/// 4. Serve requests under that owner until the client disconnects.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(token) = wait_for_authenticate(&mut ws_receiver).await else {
        tracing::warn!("connection closed before authentication");
        return;
    };

    let owner = match state.auth.authenticate(&token) {
        Ok(owner) => owner,
        Err(e) => {
            tracing::warn!(error = %e, "authentication rejected");
            let err = StoreMessage::Error {
                reason: format!("unauthenticated: {e}"),
            };
            let _ = send_store_msg(&mut ws_sender, &err).await;
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    let ack = StoreMessage::Authenticated {
        owner_id: owner.clone(),
    };
    if let Err(e) = send_store_msg(&mut ws_sender, &ack).await {
        tracing::error!(%owner, error = %e, "failed to send Authenticated ack");
        return;
    }

    tracing::info!(%owner, "client authenticated");

    // Replies go through a channel so a slow socket write never stalls reads.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer_owner = owner.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(owner = %writer_owner, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_owner = owner.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    let Some(reply) = handle_binary_message(&reader_owner, &data, &reader_state).await
                    else {
                        continue;
                    };
                    match codec::encode(&reply) {
                        Ok(bytes) => {
                            if tx.send(Message::Binary(bytes.into())).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(owner = %reader_owner, error = %e, "failed to encode reply");
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!(owner = %reader_owner, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    tracing::info!(%owner, "client disconnected");
}

/// Waits for the first message on the WebSocket, expecting `Authenticate`.
///
/// Returns the presented token, or `None` if the connection closes or a
/// different message arrives first.
async fn wait_for_authenticate(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match codec::decode(&data) {
                Ok(StoreMessage::Authenticate { token }) => return Some(token),
                Ok(other) => {
                    tracing::warn!(msg = ?other, "expected Authenticate, got different message");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode authentication message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during authentication.
            }
        }
    }
    None
}

/// Handles a binary frame from an authenticated client and returns the
/// message to send back, if any.
///
/// Malformed frames are logged and dropped. Oversized requests are answered
/// with [`StoreReply::Failed`] without touching the store.
async fn handle_binary_message(
    owner: &OwnerId,
    data: &[u8],
    state: &ServerState,
) -> Option<StoreMessage> {
    let msg = match codec::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%owner, error = %e, "failed to decode message");
            return None;
        }
    };

    match msg {
        StoreMessage::Request { request_id, op } => {
            if data.len() > state.max_payload_size {
                tracing::warn!(
                    %owner,
                    request_id,
                    size = data.len(),
                    max = state.max_payload_size,
                    "request exceeds size limit"
                );
                return Some(StoreMessage::Response {
                    request_id,
                    reply: StoreReply::Failed(format!(
                        "request too large: {} bytes (max {})",
                        data.len(),
                        state.max_payload_size
                    )),
                });
            }

            tracing::debug!(%owner, request_id, op = op.name(), "executing request");
            let reply = state.store.execute(owner, op).await;
            if let StoreReply::Failed(reason) = &reply {
                tracing::warn!(%owner, request_id, %reason, "request rejected");
            }
            Some(StoreMessage::Response { request_id, reply })
        }
        StoreMessage::Authenticate { .. } => {
            tracing::warn!(%owner, "received Authenticate on an authenticated connection");
            None
        }
        other => {
            tracing::warn!(%owner, msg = ?other, "unexpected message type from client");
            None
        }
    }
}

/// Encodes and sends a store message directly on a WebSocket sender.
async fn send_store_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &StoreMessage,
) -> Result<(), String> {
    let bytes = codec::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Returns true if the request carries `Authorization: Bearer <expected>`.
fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

/// `POST /reset`: runs the recurring reset across all owners.
async fn reset_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let authorized = state
        .reset_token
        .as_deref()
        .is_none_or(|expected| bearer_matches(&headers, expected));
    if !authorized {
        tracing::warn!("reset request with missing or wrong token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }

    match reset::run_reset(&state.store).await {
        Ok(n) => (
            StatusCode::OK,
            Json(json!({ "message": "Recurring tasks reset successfully", "reset": n })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn health() -> &'static str {
    "ok"
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Starts the server with the given state and returns the bound address and
/// a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/reset", axum::routing::post(reset_handler))
        .route("/health", axum::routing::get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
