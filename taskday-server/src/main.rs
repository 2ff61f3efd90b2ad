//! `taskday-server` -- record store backend for `taskday` clients.
//!
//! An axum server exposing the owner-scoped record store over WebSocket,
//! a `POST /reset` trigger for the daily recurring reset, and a built-in
//! scheduler that fires the same reset at a fixed time each day.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100, users from the config file
//! cargo run --bin taskday-server
//!
//! # Custom address and reset time
//! cargo run --bin taskday-server -- --bind 127.0.0.1:8080 --reset-at 04:00
//!
//! # Keep the tables in a specific file
//! cargo run --bin taskday-server -- --data-file /var/lib/taskday/tables.json
//! ```

use std::sync::Arc;

use clap::Parser;
use taskday_server::config::{ServerCliArgs, ServerConfig};
use taskday_server::reset;
use taskday_server::server::{self, ServerState};
use taskday_server::store::RecordStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, users = config.users.len(), "starting taskday server");
    if config.users.is_empty() {
        tracing::warn!("no users configured, every connection will be refused");
    }

    let store = match &config.data_file {
        Some(path) => match RecordStore::open(path).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "failed to open record store");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("no data file configured, tasks are kept in memory only");
            RecordStore::new()
        }
    };
    let store = Arc::new(store);
    let state = Arc::new(ServerState::from_config(&config, Arc::clone(&store)));

    let scheduler = reset::spawn_daily(store, config.reset_at);
    tracing::info!(reset_at = %config.reset_at, "daily recurring reset scheduled (UTC)");

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            scheduler.abort();
            std::process::exit(1);
        }
    }
    scheduler.abort();
}
