//! Record store abstraction for `taskday`.
//!
//! Defines the [`Store`] trait the ledger persists through. Concrete
//! implementations:
//! - [`memory::MemoryStore`]: in-process tables with fault injection
//! - [`remote::RemoteStore`]: WebSocket client for `taskday-server`

pub mod memory;
pub mod remote;

use taskday_proto::codec::CodecError;
use taskday_proto::store::{Draft, EngineError, Filter, Order, Patch, Record, Table};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store refused the operation (bad patch, missing owner, ...).
    #[error("store rejected the operation: {0}")]
    Rejected(String),

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The connection to the store has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The request did not complete in time.
    #[error("store request timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The server refused the session token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server answered with something other than what was asked for.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A wire message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<EngineError> for StoreError {
    fn from(err: EngineError) -> Self {
        Self::Rejected(err.to_string())
    }
}

/// Async record store with row-level ownership.
///
/// Every implementation is bound to a single owner: selects only see that
/// owner's rows, inserts are stamped with it, and updates or deletes never
/// reach another owner's rows.
pub trait Store: Send + Sync {
    /// Returns the rows of `table` matching every filter, optionally sorted.
    fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> impl std::future::Future<Output = Result<Vec<Record>, StoreError>> + Send;

    /// Inserts a draft and returns the stored record with generated fields.
    fn insert(
        &self,
        draft: Draft,
    ) -> impl std::future::Future<Output = Result<Record, StoreError>> + Send;

    /// Applies `patch` to matching rows and returns how many changed.
    fn update(
        &self,
        table: Table,
        patch: &Patch,
        filters: &[Filter],
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Deletes matching rows and returns how many were removed.
    fn delete(
        &self,
        table: Table,
        filters: &[Filter],
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
