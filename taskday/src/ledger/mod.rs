//! Task ledger for `taskday`.
//!
//! The ledger keeps a cached copy of one user's tasks, applies mutations
//! through the [`Store`](crate::store::Store), and derives the today,
//! recurring and history views from the cache. Reorders are applied to the
//! cache optimistically; if any position write fails, the affected
//! partition is reloaded from the store.

pub mod task_ledger;
pub mod views;

pub use task_ledger::TaskLedger;
pub use views::DayTasks;

use chrono::NaiveDate;
use taskday_proto::task::Partition;
use thiserror::Error;

use crate::store::StoreError;

/// Bad input, rejected before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Task title is empty after trimming.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long ({len} characters, max {max})")]
    TitleTooLong {
        /// Length of the trimmed title in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The submitted order is not a permutation of the partition.
    #[error("reorder of {partition} tasks is not a permutation: {reason}")]
    NotAPermutation {
        /// Partition being reordered.
        partition: Partition,
        /// What was wrong with the submitted ids.
        reason: String,
    },
    /// A report window around this day falls outside the calendar range.
    #[error("no report window around {0}")]
    DateOutOfRange(NaiveDate),
    /// Breakdown asked for more weeks than allowed.
    #[error("too many weeks in breakdown ({requested}, max {max})")]
    TooManyWeeks { requested: u32, max: u32 },
}

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The input was rejected; nothing changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No task with this id is owned by the caller.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The store failed; the cached view is unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// There is no signed-in user.
    #[error("not signed in")]
    Unauthenticated,

    /// A reorder write failed and the partition was reloaded from the store.
    #[error("reorder of {partition} tasks failed and was reconciled: {source}")]
    Reconciled {
        /// Partition that was reloaded.
        partition: Partition,
        /// The write failure that triggered the reload.
        source: StoreError,
    },
}
