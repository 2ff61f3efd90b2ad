//! Personal daily task ledger library.
//!
//! The [`ledger::TaskLedger`] owns a user's tasks and their derived views,
//! [`report::ScoreAggregator`] turns completed tasks into period scores,
//! and [`notify::NotificationFeed`] manages the notifications the ledger
//! emits. Persistence goes through the [`store::Store`] trait.

pub mod clock;
pub mod config;
pub mod ledger;
pub mod notify;
pub mod output;
pub mod report;
pub mod session;
pub mod store;
