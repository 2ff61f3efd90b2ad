//! Property-based tests for the ledger and score arithmetic.
//!
//! Uses proptest to verify:
//! 1. After any sequence of toggles, `completed` is set exactly when
//!    `completed_at` is, and two toggles restore `completed`.
//! 2. Reordering a partition by any permutation yields exactly that order,
//!    densely numbered from 0, in the view and in the store.
//! 3. `normalize` stays within 0..=100, never decreases as the score grows,
//!    and a zero cap yields 0.
//! 4. `aggregate` counts each completed task in the window once and weighs
//!    habits double.
//! 5. `progress` is the rounded share of the today view that is done.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use taskday::clock::ManualClock;
use taskday::ledger::TaskLedger;
use taskday::report::ScoreAggregator;
use taskday::session::Session;
use taskday::store::memory::MemoryStore;
use taskday_proto::task::{OwnerId, Partition, Task, TaskId};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

async fn ledger_with(
    titles: usize,
    recurring: impl Fn(usize) -> bool,
) -> (TaskLedger<MemoryStore>, MemoryStore, Arc<ManualClock>, Vec<TaskId>) {
    let owner = OwnerId::new("alice");
    let store = MemoryStore::new(owner.clone());
    let clock = Arc::new(ManualClock::new(start()));
    let mut ledger = TaskLedger::open(
        store.clone(),
        &Session::Authenticated(owner),
        clock.clone(),
        FixedOffset::east_opt(0).unwrap(),
    )
    .await
    .unwrap();
    let mut ids = Vec::new();
    for i in 0..titles {
        let task = ledger.add_task(&format!("task {i}"), recurring(i)).await.unwrap();
        ids.push(task.id);
    }
    (ledger, store, clock, ids)
}

fn consistent(tasks: &[Task]) -> bool {
    tasks.iter().all(|t| t.completed == t.completed_at.is_some())
}

fn arb_done_task(window_start: DateTime<Utc>) -> impl Strategy<Value = Task> {
    (any::<bool>(), any::<bool>(), -3_i64..10).prop_map(move |(completed, recurring, day)| {
        let at = window_start + Duration::days(day);
        Task {
            id: TaskId::new(),
            owner_id: OwnerId::new("alice"),
            title: "t".to_string(),
            completed,
            recurring,
            created_at: at,
            completed_at: completed.then_some(at),
            position: 0,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // --- toggle ---

    #[test]
    fn toggles_keep_completion_consistent(
        n in 1_usize..6,
        toggles in prop::collection::vec(0_usize..6, 0..20),
        habit_mask in any::<u8>(),
    ) {
        runtime().block_on(async {
            let (mut ledger, store, clock, ids) =
                ledger_with(n, |i| habit_mask & (1 << i) != 0).await;

            for pick in toggles {
                let id = &ids[pick % n];
                let before = ledger.get(id).unwrap().completed;
                clock.advance(Duration::minutes(1));

                let after = ledger.toggle_task(id).await.unwrap();
                prop_assert_eq!(after.completed, !before);
                prop_assert!(consistent(ledger.tasks()));
                prop_assert!(consistent(&store.stored_tasks()));

                let again = ledger.toggle_task(id).await.unwrap();
                prop_assert_eq!(again.completed, before);
                prop_assert_eq!(again.completed_at.is_some(), before);
                ledger.toggle_task(id).await.unwrap();
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    // --- reorder ---

    #[test]
    fn reorder_yields_the_submitted_order(
        perm in (1_usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
        recurring in any::<bool>(),
    ) {
        runtime().block_on(async {
            let n = perm.len();
            let (mut ledger, store, _clock, ids) = ledger_with(n, |_| recurring).await;
            let wanted: Vec<TaskId> = perm.iter().map(|&i| ids[i].clone()).collect();
            let partition = if recurring { Partition::Recurring } else { Partition::Active };

            ledger.reorder(partition, &wanted).await.unwrap();

            let view: Vec<&Task> = if recurring {
                ledger.view_recurring()
            } else {
                ledger.view_today()
            };
            let got: Vec<TaskId> = view.iter().map(|t| t.id.clone()).collect();
            prop_assert_eq!(&got, &wanted);
            let positions: Vec<i64> = view.iter().map(|t| t.position).collect();
            prop_assert_eq!(positions, (0..n as i64).collect::<Vec<_>>());

            let stored: Vec<TaskId> = store.stored_tasks().into_iter().map(|t| t.id).collect();
            prop_assert_eq!(stored, wanted);
            Ok::<(), TestCaseError>(())
        })?;
    }

    // --- scores ---

    #[test]
    fn normalize_is_bounded_and_monotone(score in 0_u64..10_000, extra in 0_u64..100, cap in 0_u64..500) {
        let pct = ScoreAggregator::normalize(score, cap);
        prop_assert!(pct <= 100);
        prop_assert!(ScoreAggregator::normalize(score + extra, cap) >= pct);
        if cap == 0 {
            prop_assert_eq!(pct, 0);
        } else {
            prop_assert_eq!(ScoreAggregator::normalize(cap, cap), 100);
            if score >= cap {
                prop_assert_eq!(pct, 100);
            }
        }
    }

    #[test]
    fn aggregate_weighs_habits_double(tasks in prop::collection::vec(arb_done_task(start()), 0..20)) {
        let end = start() + Duration::days(7);
        let totals = ScoreAggregator::aggregate(&tasks, start(), end);

        let inside: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.completed_at.is_some_and(|at| at >= start() && at <= end))
            .collect();
        let habits = inside.iter().filter(|t| t.recurring).count() as u64;
        prop_assert_eq!(totals.completed_count, inside.len() as u64);
        prop_assert_eq!(totals.score, inside.len() as u64 + habits);
    }

    #[test]
    fn progress_is_rounded_share(
        n in 0_usize..8,
        done_mask in any::<u8>(),
        habit_mask in any::<u8>(),
    ) {
        runtime().block_on(async {
            let (mut ledger, _store, _clock, ids) =
                ledger_with(n, |i| habit_mask & (1 << i) != 0).await;
            for (i, id) in ids.iter().enumerate() {
                if done_mask & (1 << i) != 0 {
                    ledger.toggle_task(id).await.unwrap();
                }
            }

            let view = ledger.view_today();
            let total = view.len() as u32;
            let done = view.iter().filter(|t| t.completed).count() as u32;
            let expected = if total == 0 { 0 } else { (done * 200 + total) / (total * 2) };
            prop_assert_eq!(ledger.progress(), expected);
            prop_assert!(ledger.progress() <= 100);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
