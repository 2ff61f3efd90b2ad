//! WebSocket store client for `taskday-server`.
//!
//! Implements the [`Store`] trait by sending [`StoreMessage::Request`]
//! frames and waiting for the matching [`StoreMessage::Response`]. A
//! background reader task routes responses to waiting callers by
//! `request_id`, so several requests (such as the writes of one reorder)
//! can be in flight at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskday_proto::codec;
use taskday_proto::protocol::{StoreMessage, StoreOp, StoreReply};
use taskday_proto::store::{Draft, Filter, Order, Patch, Record, Table};
use taskday_proto::task::OwnerId;

use super::{Store, StoreError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Requests waiting for a response, keyed by request id.
type Pending = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<StoreReply>>>>;

/// Default timeout for connecting to the server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the authentication handshake.
const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a single store request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`Store`] backed by a `taskday-server` connection.
///
/// Created via [`RemoteStore::connect`], which opens the WebSocket,
/// authenticates, and spawns a background reader task.
pub struct RemoteStore {
    /// Owner the server bound this connection to.
    owner: OwnerId,
    /// Server URL (ws:// or wss://).
    server_url: String,
    ws_sender: Arc<Mutex<WsSender>>,
    pending: Pending,
    next_request_id: AtomicU64,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl RemoteStore {
    /// Connects to `server_url` and authenticates with `token`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if connecting or authenticating times out.
    /// - [`StoreError::Unreachable`] if the server cannot be connected to.
    /// - [`StoreError::AuthFailed`] if the server rejects the token.
    /// - [`StoreError::ConnectionClosed`] if the server hangs up mid-handshake.
    pub async fn connect(
        server_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(server_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = server_url, "store WebSocket connect timed out");
                    StoreError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = server_url, err = %e, "store WebSocket connect failed");
                    StoreError::Unreachable(e.to_string())
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let auth = codec::encode(&StoreMessage::Authenticate {
            token: token.to_string(),
        })?;
        ws_sender
            .send(Message::Binary(auth.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Authenticate message");
                StoreError::ConnectionClosed
            })?;

        let reply = tokio::time::timeout(AUTH_TIMEOUT, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = server_url, "store authentication timed out");
                StoreError::Timeout
            })?;

        let owner = match reply {
            Some(Ok(Message::Binary(data))) => match codec::decode(&data)? {
                StoreMessage::Authenticated { owner_id } => owner_id,
                StoreMessage::Error { reason } => {
                    tracing::warn!(reason = %reason, "store authentication rejected");
                    return Err(StoreError::AuthFailed(reason));
                }
                other => {
                    tracing::warn!(?other, "unexpected message during authentication");
                    return Err(StoreError::Protocol(
                        "unexpected message during authentication".into(),
                    ));
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("server closed connection during authentication");
                return Err(StoreError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                return Err(StoreError::Protocol(
                    "unexpected non-binary frame during authentication".into(),
                ));
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket error during authentication");
                return Err(StoreError::ConnectionClosed);
            }
        };

        tracing::info!(owner = %owner, url = server_url, "authenticated with store server");

        let pending: Pending = Arc::default();
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        Ok(Self {
            owner,
            server_url: server_url.to_string(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            pending,
            next_request_id: AtomicU64::new(1),
            connected,
            request_timeout,
            _reader_handle: reader_handle,
        })
    }

    /// Returns the owner this connection is authenticated as.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the server URL.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Returns true while the connection to the server is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends one operation and waits for its reply.
    async fn request(&self, op: StoreOp) -> Result<StoreReply, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::ConnectionClosed);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let op_name = op.name();
        let bytes = codec::encode(&StoreMessage::Request { request_id, op })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        let sent = {
            let mut sender = self.ws_sender.lock().await;
            sender.send(Message::Binary(bytes.into())).await
        };
        if let Err(e) = sent {
            tracing::warn!(err = %e, request_id, "store send failed");
            self.pending.lock().remove(&request_id);
            self.connected.store(false, Ordering::Relaxed);
            return Err(StoreError::ConnectionClosed);
        }
        tracing::debug!(request_id, op = op_name, "store request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(StoreReply::Failed(reason))) => Err(StoreError::Rejected(reason)),
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(StoreError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                tracing::warn!(request_id, op = op_name, "store request timed out");
                Err(StoreError::Timeout)
            }
        }
    }
}

impl Store for RemoteStore {
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Record>, StoreError> {
        let op = StoreOp::Select {
            table,
            filters: filters.to_vec(),
            order,
        };
        match self.request(op).await? {
            StoreReply::Records(records) => Ok(records),
            other => Err(unexpected("select", &other)),
        }
    }

    async fn insert(&self, draft: Draft) -> Result<Record, StoreError> {
        match self.request(StoreOp::Insert { draft }).await? {
            StoreReply::Inserted(record) => Ok(record),
            other => Err(unexpected("insert", &other)),
        }
    }

    async fn update(
        &self,
        table: Table,
        patch: &Patch,
        filters: &[Filter],
    ) -> Result<u64, StoreError> {
        let op = StoreOp::Update {
            table,
            patch: patch.clone(),
            filters: filters.to_vec(),
        };
        match self.request(op).await? {
            StoreReply::Affected(n) => Ok(n),
            other => Err(unexpected("update", &other)),
        }
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        let op = StoreOp::Delete {
            table,
            filters: filters.to_vec(),
        };
        match self.request(op).await? {
            StoreReply::Affected(n) => Ok(n),
            other => Err(unexpected("delete", &other)),
        }
    }
}

fn unexpected(op: &str, reply: &StoreReply) -> StoreError {
    StoreError::Protocol(format!("unexpected reply to {op}: {reply:?}"))
}

/// Background task that reads responses and completes pending requests.
///
/// Malformed frames are logged and skipped. When the socket closes, every
/// pending request is dropped so its caller sees
/// [`StoreError::ConnectionClosed`].
async fn reader_loop(mut ws_reader: WsReader, pending: Pending, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match codec::decode(&data) {
                Ok(StoreMessage::Response { request_id, reply }) => {
                    let waiter = pending.lock().remove(&request_id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(reply);
                        }
                        None => {
                            tracing::debug!(request_id, "response for unknown request, dropping");
                        }
                    }
                }
                Ok(StoreMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "store server error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected store message type");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed store frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "store WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    pending.lock().clear();
    tracing::info!("store reader task exiting");
}
