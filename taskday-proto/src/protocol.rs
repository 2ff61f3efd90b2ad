//! Store wire protocol between `taskday` clients and `taskday-server`.
//!
//! Defines the [`StoreMessage`] enum that is postcard-encoded (see
//! [`crate::codec`]) and sent over WebSocket binary frames.

use serde::{Deserialize, Serialize};

use crate::store::{Draft, Filter, Order, Patch, Record, Table};
use crate::task::OwnerId;

/// Messages exchanged between store clients and the server.
///
/// A client authenticates first, then issues requests tagged with an id it
/// chooses. The server answers each request with a response carrying the
/// same id; ownership is taken from the authenticated session, never from
/// the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMessage {
    /// Client presents its bearer token.
    ///
    /// Must be the first message sent after the WebSocket connects.
    Authenticate {
        /// Opaque token issued to the user.
        token: String,
    },

    /// Server accepted the token.
    Authenticated {
        /// Owner all subsequent requests are scoped to.
        owner_id: OwnerId,
    },

    /// A store operation.
    Request {
        /// Client-chosen correlation id.
        request_id: u64,
        /// The operation to perform.
        op: StoreOp,
    },

    /// Result of a store operation.
    Response {
        /// Correlation id copied from the request.
        request_id: u64,
        /// Outcome.
        reply: StoreReply,
    },

    /// Server reports a connection-level error.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// The four operations of the record store contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    Select {
        table: Table,
        filters: Vec<Filter>,
        order: Option<Order>,
    },
    Insert {
        draft: Draft,
    },
    Update {
        table: Table,
        patch: Patch,
        filters: Vec<Filter>,
    },
    Delete {
        table: Table,
        filters: Vec<Filter>,
    },
}

impl StoreOp {
    /// Short operation name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Select { .. } => "select",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Outcome of a [`StoreOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreReply {
    /// Rows returned by a select.
    Records(Vec<Record>),
    /// The row created by an insert, with generated fields filled in.
    Inserted(Record),
    /// Number of rows changed by an update or delete.
    Affected(u64),
    /// The operation was rejected or could not be performed.
    Failed(String),
}
