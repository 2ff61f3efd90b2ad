//! Integration tests for the daily reset of recurring tasks.
//!
//! The reset makes every completed recurring task incomplete again, for all
//! owners at once, and leaves one-off tasks alone. Open sessions pick the
//! change up on their next reload.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone, Utc};

use taskday::clock::ManualClock;
use taskday::ledger::TaskLedger;
use taskday::session::Session;
use taskday::store::Store;
use taskday::store::memory::MemoryStore;
use taskday::store::remote::RemoteStore;
use taskday_proto::task::{OwnerId, Task};
use taskday_server::auth::{TokenAuth, UserEntry};
use taskday_server::server::{ServerState, start_server_with_state};
use taskday_server::store::RecordStore;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
    ))
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

async fn open<S: Store>(store: S, owner: &str) -> TaskLedger<S> {
    TaskLedger::open(
        store,
        &Session::Authenticated(OwnerId::new(owner)),
        clock(),
        utc(),
    )
    .await
    .unwrap()
}

fn find<'a>(ledger: &'a TaskLedger<impl Store>, title: &str) -> &'a Task {
    ledger
        .tasks()
        .iter()
        .find(|t| t.title == title)
        .expect("task should exist")
}

// =============================================================================
// Reset through the store
// =============================================================================

#[tokio::test]
async fn stretch_is_reset_and_buy_milk_is_not() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let mut ledger = open(store.clone(), "alice").await;

    let stretch = ledger.add_task("Stretch", true).await.unwrap();
    let milk = ledger.add_task("Buy milk", false).await.unwrap();
    ledger.toggle_task(&stretch.id).await.unwrap();
    let milk_done = ledger.toggle_task(&milk.id).await.unwrap();

    assert_eq!(store.reset_recurring().unwrap(), 1);

    // the open session still shows the old state until it reloads
    assert!(find(&ledger, "Stretch").completed);
    ledger.reload().await.unwrap();

    let stretch = find(&ledger, "Stretch");
    assert!(!stretch.completed);
    assert_eq!(stretch.completed_at, None);
    let milk = find(&ledger, "Buy milk");
    assert!(milk.completed);
    assert_eq!(milk.completed_at, milk_done.completed_at);

    // reset tasks are back on the today list and out of history
    assert!(ledger.view_history().iter().all(|t| !t.recurring));
    assert!(ledger.view_today().iter().any(|t| t.title == "Stretch"));
}

#[tokio::test]
async fn reset_is_idempotent() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let mut ledger = open(store.clone(), "alice").await;
    let stretch = ledger.add_task("Stretch", true).await.unwrap();
    ledger.toggle_task(&stretch.id).await.unwrap();

    assert_eq!(store.reset_recurring().unwrap(), 1);
    assert_eq!(store.reset_recurring().unwrap(), 0);

    // an incomplete recurring task is not touched
    ledger.reload().await.unwrap();
    assert!(!find(&ledger, "Stretch").completed);
}

#[tokio::test]
async fn reset_covers_every_owner() {
    let alice_store = MemoryStore::new(OwnerId::new("alice"));
    let bob_store = alice_store.for_owner(OwnerId::new("bob"));
    let mut alice = open(alice_store.clone(), "alice").await;
    let mut bob = open(bob_store, "bob").await;

    for ledger in [&mut alice, &mut bob] {
        let task = ledger.add_task("Stretch", true).await.unwrap();
        ledger.toggle_task(&task.id).await.unwrap();
    }

    assert_eq!(alice_store.reset_recurring().unwrap(), 2);

    alice.reload().await.unwrap();
    bob.reload().await.unwrap();
    assert!(!find(&alice, "Stretch").completed);
    assert!(!find(&bob, "Stretch").completed);
}

// =============================================================================
// Reset over HTTP
// =============================================================================

/// Sends `POST /reset` and returns the status code and JSON body.
fn post_reset(addr: SocketAddr, bearer: Option<&str>) -> (u16, serde_json::Value) {
    use std::io::{Read, Write};

    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    let auth = bearer
        .map(|t| format!("Authorization: Bearer {t}\r\n"))
        .unwrap_or_default();
    write!(
        stream,
        "POST /reset HTTP/1.1\r\nHost: {addr}\r\n{auth}Content-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status line");
    let body = response.split("\r\n\r\n").nth(1).expect("response body");
    (status, serde_json::from_str(body).expect("JSON body"))
}

async fn start_server(reset_token: Option<&str>) -> (SocketAddr, String) {
    let auth = TokenAuth::from_users(&[UserEntry {
        token: "t-alice".to_string(),
        owner: "alice".to_string(),
    }]);
    let mut state = ServerState::new(Arc::new(RecordStore::new()), auth);
    if let Some(token) = reset_token {
        state = state.with_reset_token(token);
    }
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::new(state))
        .await
        .expect("failed to start server");
    (addr, format!("ws://{addr}/ws"))
}

#[tokio::test]
async fn http_reset_clears_remote_habits() {
    let (addr, url) = start_server(None).await;
    let store = RemoteStore::connect(&url, "t-alice", Duration::from_secs(5))
        .await
        .unwrap();
    let mut ledger = open(store, "alice").await;

    let stretch = ledger.add_task("Stretch", true).await.unwrap();
    ledger.add_task("Buy milk", false).await.unwrap();
    ledger.toggle_task(&stretch.id).await.unwrap();

    let (status, body) = tokio::task::spawn_blocking(move || post_reset(addr, None))
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Recurring tasks reset successfully");
    assert_eq!(body["reset"], 1);

    ledger.reload().await.unwrap();
    assert!(!find(&ledger, "Stretch").completed);

    let (status, body) = tokio::task::spawn_blocking(move || post_reset(addr, None))
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["reset"], 0);
}

#[tokio::test]
async fn http_reset_requires_configured_token() {
    let (addr, _url) = start_server(Some("cron-secret")).await;

    let (status, body) = tokio::task::spawn_blocking(move || post_reset(addr, None))
        .await
        .unwrap();
    assert_eq!(status, 401);
    assert!(body["error"].is_string());

    let (status, _) = tokio::task::spawn_blocking(move || post_reset(addr, Some("wrong")))
        .await
        .unwrap();
    assert_eq!(status, 401);

    let (status, body) =
        tokio::task::spawn_blocking(move || post_reset(addr, Some("cron-secret")))
            .await
            .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["reset"], 0);
}
