//! Integration tests for the task lifecycle through the public ledger API.
//!
//! Drives a [`TaskLedger`] over an in-memory store and checks what a user
//! would see after each step:
//! - add, complete, and delete a one-off task
//! - recurring tasks in both the today and recurring views
//! - the day view, progress, and period reports
//! - the notifications emitted along the way

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

use taskday::clock::ManualClock;
use taskday::ledger::{LedgerError, TaskLedger, ValidationError};
use taskday::notify::NotificationFeed;
use taskday::report::Period;
use taskday::session::Session;
use taskday::store::memory::MemoryStore;
use taskday_proto::notification::NotificationKind;
use taskday_proto::task::{OwnerId, TaskId};

fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn session() -> Session {
    Session::Authenticated(OwnerId::new("alice"))
}

async fn open(
    store: &MemoryStore,
    clock: &Arc<ManualClock>,
    offset: FixedOffset,
) -> TaskLedger<MemoryStore> {
    TaskLedger::open(store.clone(), &session(), clock.clone(), offset)
        .await
        .expect("ledger should open")
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

// =============================================================================
// One-off task: add, complete, delete from history
// =============================================================================

#[tokio::test]
async fn buy_milk_end_to_end() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    let milk = ledger.add_task("Buy milk", false).await.unwrap();
    assert_eq!(milk.position, 0);
    let today = ledger.view_today();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].id, milk.id);

    clock.advance(Duration::minutes(30));
    let done = ledger.toggle_task(&milk.id).await.unwrap();
    assert!(done.completed);
    assert_eq!(done.completed_at, Some(clock_now(&clock)));
    assert!(ledger.view_today().is_empty());
    assert_eq!(ledger.view_history()[0].id, milk.id);

    clock.advance(Duration::minutes(1));
    ledger.delete_task(&milk.id).await.unwrap();
    assert!(ledger.view_history().is_empty());
    assert!(store.stored_tasks().is_empty());

    let feed = NotificationFeed::new(&store, &session()).unwrap();
    let notes = feed.fetch().await;
    let deleted: Vec<_> = notes.iter().filter(|n| n.title == "Task deleted").collect();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].kind, NotificationKind::Info);
    assert!(deleted[0].message.contains("Buy milk"));

    // newest first: deleted, completed, added
    let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Task deleted", "Task completed", "Task added"]);
    assert_eq!(NotificationFeed::<MemoryStore>::unread_count(&notes), 3);
}

fn clock_now(clock: &ManualClock) -> DateTime<Utc> {
    use taskday::clock::Clock;
    clock.now()
}

#[tokio::test]
async fn reopened_task_returns_to_today_without_timestamp() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    let task = ledger.add_task("Call mom", false).await.unwrap();
    ledger.toggle_task(&task.id).await.unwrap();
    let reopened = ledger.toggle_task(&task.id).await.unwrap();

    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, None);
    assert_eq!(reopened.position, task.position);
    assert_eq!(ledger.view_today().len(), 1);
    assert!(ledger.view_history().is_empty());

    let stored = store.stored_tasks();
    assert_eq!(stored[0].completed_at, None);
}

// =============================================================================
// Recurring tasks and positions
// =============================================================================

#[tokio::test]
async fn recurring_tasks_show_in_both_views_with_separate_positions() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    let a = ledger.add_task("Buy milk", false).await.unwrap();
    let b = ledger.add_task("Stretch", true).await.unwrap();
    let c = ledger.add_task("Pay rent", false).await.unwrap();
    let d = ledger.add_task("Read", true).await.unwrap();

    assert_eq!((a.position, c.position), (0, 1));
    assert_eq!((b.position, d.position), (0, 1));

    ledger.toggle_task(&b.id).await.unwrap();
    let recurring: Vec<TaskId> = ledger.view_recurring().iter().map(|t| t.id.clone()).collect();
    assert_eq!(recurring, vec![b.id.clone(), d.id.clone()]);

    // completed recurring tasks stay on the today view
    let today = ledger.view_today();
    assert_eq!(today.len(), 4);
    assert!(today.iter().any(|t| t.id == b.id && t.completed));
}

#[tokio::test]
async fn rejected_input_changes_nothing() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    assert!(matches!(
        ledger.add_task("   ", false).await,
        Err(LedgerError::Validation(ValidationError::TitleEmpty))
    ));
    assert!(matches!(
        ledger.toggle_task(&TaskId::new()).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        ledger.delete_task(&TaskId::new()).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(ledger.tasks().is_empty());
    let feed = NotificationFeed::new(&store, &session()).unwrap();
    assert!(feed.fetch().await.is_empty());
}

#[tokio::test]
async fn another_owners_task_is_not_found() {
    let alice = MemoryStore::new(OwnerId::new("alice"));
    let bob = alice.for_owner(OwnerId::new("bob"));
    let clock = Arc::new(ManualClock::new(monday_morning()));

    let mut alice_ledger = open(&alice, &clock, utc()).await;
    let task = alice_ledger.add_task("Secret", false).await.unwrap();

    let mut bob_ledger = TaskLedger::open(
        bob,
        &Session::Authenticated(OwnerId::new("bob")),
        clock.clone(),
        utc(),
    )
    .await
    .unwrap();
    assert!(bob_ledger.tasks().is_empty());
    assert!(matches!(
        bob_ledger.toggle_task(&task.id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(!alice.stored_tasks()[0].completed);
}

// =============================================================================
// Views over time: day view, progress, reports
// =============================================================================

#[tokio::test]
async fn day_view_uses_local_calendar_day() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    // 23:30 UTC on the 9th is already the 10th at UTC+2
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 9, 23, 30, 0).unwrap(),
    ));
    let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
    let mut ledger = open(&store, &clock, plus_two).await;

    let early = ledger.add_task("Early", false).await.unwrap();
    clock.advance(Duration::hours(12));
    let later = ledger.add_task("Later", false).await.unwrap();
    ledger.toggle_task(&early.id).await.unwrap();

    let tenth = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    let day = ledger.tasks_on_date(tenth);
    let created: Vec<TaskId> = day.created.iter().map(|t| t.id.clone()).collect();
    assert_eq!(created, vec![early.id.clone(), later.id.clone()]);
    assert_eq!(day.completed.len(), 1);
    assert_eq!(day.completed[0].id, early.id);

    let ninth = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
    assert!(ledger.tasks_on_date(ninth).created.is_empty());
}

#[tokio::test]
async fn progress_rounds_over_today_view() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;
    assert_eq!(ledger.progress(), 0);

    let stretch = ledger.add_task("Stretch", true).await.unwrap();
    ledger.add_task("Buy milk", false).await.unwrap();
    ledger.add_task("Pay rent", false).await.unwrap();
    ledger.toggle_task(&stretch.id).await.unwrap();

    assert_eq!(ledger.progress(), 33);
}

#[tokio::test]
async fn weekly_report_weights_recurring_tasks() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    let stretch = ledger.add_task("Stretch", true).await.unwrap();
    let milk = ledger.add_task("Buy milk", false).await.unwrap();
    ledger.add_task("Never done", false).await.unwrap();
    ledger.toggle_task(&stretch.id).await.unwrap();
    clock.advance(Duration::days(2));
    ledger.toggle_task(&milk.id).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
    let week = ledger.report(Period::Week, today).await.unwrap();
    assert_eq!(week.completed_count, 2);
    assert_eq!(week.score, 3);
    assert_eq!(week.normalized, 6);
    assert_eq!(week.start, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());

    // the following week sees nothing
    let next = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
    let empty = ledger.report(Period::Week, next).await.unwrap();
    assert_eq!((empty.completed_count, empty.score, empty.normalized), (0, 0, 0));

    let month = ledger.report(Period::Month, today).await.unwrap();
    assert_eq!(month.score, 3);
    assert_eq!(month.normalized, 2);
}

#[tokio::test]
async fn breakdown_numbers_weeks_from_start_day() {
    let store = MemoryStore::new(OwnerId::new("alice"));
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let mut ledger = open(&store, &clock, utc()).await;

    let task = ledger.add_task("Stretch", true).await.unwrap();
    ledger.toggle_task(&task.id).await.unwrap();

    let first = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
    let weeks = ledger.weekly_breakdown(first, 4).await.unwrap();
    assert_eq!(weeks.len(), 4);
    let numbers: Vec<u32> = weeks.iter().map(|w| w.week_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let scored: Vec<u64> = weeks.iter().map(|w| w.score).collect();
    assert_eq!(scored, vec![0, 2, 0, 0]);
}
