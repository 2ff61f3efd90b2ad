//! `taskday` server library.
//!
//! Exposes the record store server for use in tests and embedding. The
//! server authenticates WebSocket clients by bearer token, serves the
//! record store with row-level ownership, and runs the daily reset of
//! recurring tasks.

pub mod auth;
pub mod config;
pub mod reset;
pub mod server;
pub mod store;
