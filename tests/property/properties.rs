//! Property-based tests for the record engine and wire codec.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in `decode`.
//! 2. Ordered selects are sorted and keep insertion order among equal keys.
//! 3. Owner scope never exposes or deletes another owner's rows.
//! 4. A rejected patch leaves every row untouched.
//! 5. The recurring reset clears exactly the completed habits and is
//!    idempotent.
//! 6. Filters agree with the task fields they test.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use taskday_proto::codec;
use taskday_proto::protocol::{StoreMessage, StoreReply};
use taskday_proto::store::{Draft, Field, Filter, Order, Patch, Record, Scope, Table, Tables, Value};
use taskday_proto::task::{OwnerId, Task, TaskDraft, TaskId};
use uuid::Uuid;

// --- strategies ---

fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000_i64..1_900_000_000).prop_map(|s| Utc.timestamp_opt(s, 0).unwrap())
}

fn arb_owner() -> impl Strategy<Value = OwnerId> {
    prop_oneof![Just("alice"), Just("bob"), Just("carol")].prop_map(OwnerId::new)
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        any::<u128>(),
        arb_owner(),
        "[a-zA-Z ]{1,24}",
        any::<bool>(),
        any::<bool>(),
        arb_time(),
        arb_time(),
        -5_i64..5,
    )
        .prop_map(
            |(id, owner_id, title, completed, recurring, created_at, done_at, position)| Task {
                id: TaskId::from_uuid(Uuid::from_u128(id)),
                owner_id,
                title,
                completed,
                recurring,
                created_at,
                completed_at: completed.then_some(done_at),
                position,
            },
        )
}

/// A row to insert: its owner, the draft, and whether to complete it.
fn arb_row() -> impl Strategy<Value = (OwnerId, TaskDraft, bool)> {
    (arb_owner(), "[a-z]{1,8}", any::<bool>(), arb_time(), -3_i64..3, any::<bool>()).prop_map(
        |(owner, title, recurring, created_at, position, complete)| {
            (
                owner,
                TaskDraft {
                    title,
                    recurring,
                    created_at,
                    position,
                },
                complete,
            )
        },
    )
}

/// Inserts every row under its owner, completing the flagged ones.
fn populate(rows: &[(OwnerId, TaskDraft, bool)]) -> (Tables, Vec<TaskId>) {
    let mut tables = Tables::new();
    let mut ids = Vec::new();
    for (owner, draft, complete) in rows {
        let scope = Scope::Owner(owner.clone());
        let record = tables.insert(&scope, Draft::Task(draft.clone())).unwrap();
        let task = record.into_task().unwrap();
        if *complete {
            let patch = Patch::new()
                .set(Field::Completed, true)
                .set(Field::CompletedAt, draft.created_at);
            tables
                .update(&scope, Table::Tasks, &patch, &[Filter::eq(Field::Id, &task.id)])
                .unwrap();
        }
        ids.push(task.id);
    }
    (tables, ids)
}

fn all_tasks(tables: &Tables) -> Vec<Task> {
    tables
        .select(&Scope::Service, Table::Tasks, &[], None)
        .into_iter()
        .filter_map(Record::into_task)
        .collect()
}

proptest! {
    // --- codec ---

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&bytes);
    }

    #[test]
    fn records_survive_the_wire(tasks in prop::collection::vec(arb_task(), 0..8), request_id in any::<u64>()) {
        let msg = StoreMessage::Response {
            request_id,
            reply: StoreReply::Records(tasks.into_iter().map(Record::Task).collect()),
        };
        let bytes = codec::encode(&msg).unwrap();
        prop_assert_eq!(codec::decode(&bytes).unwrap(), msg);
    }

    // --- ordering ---

    #[test]
    fn ordered_select_is_sorted_and_stable(rows in prop::collection::vec(arb_row(), 0..24)) {
        let rows: Vec<_> = rows
            .into_iter()
            .map(|(_, draft, complete)| (OwnerId::new("alice"), draft, complete))
            .collect();
        let (tables, ids) = populate(&rows);
        let scope = Scope::Owner(OwnerId::new("alice"));
        let inserted_at = |id: &TaskId| ids.iter().position(|x| x == id).unwrap();

        let asc: Vec<Task> = tables
            .select(&scope, Table::Tasks, &[], Some(Order::asc(Field::Position)))
            .into_iter()
            .filter_map(Record::into_task)
            .collect();
        prop_assert_eq!(asc.len(), rows.len());
        for pair in asc.windows(2) {
            prop_assert!(pair[0].position <= pair[1].position);
            if pair[0].position == pair[1].position {
                prop_assert!(inserted_at(&pair[0].id) < inserted_at(&pair[1].id));
            }
        }

        let desc: Vec<Task> = tables
            .select(&scope, Table::Tasks, &[], Some(Order::desc(Field::Position)))
            .into_iter()
            .filter_map(Record::into_task)
            .collect();
        for pair in desc.windows(2) {
            prop_assert!(pair[0].position >= pair[1].position);
        }
    }

    // --- ownership ---

    #[test]
    fn owner_scope_isolates_rows(rows in prop::collection::vec(arb_row(), 0..24)) {
        let (mut tables, _) = populate(&rows);
        let alice = OwnerId::new("alice");
        let count = |owner: &OwnerId| rows.iter().filter(|(o, _, _)| o == owner).count();

        for name in ["alice", "bob", "carol"] {
            let owner = OwnerId::new(name);
            let visible = tables.select(&Scope::Owner(owner.clone()), Table::Tasks, &[], None);
            prop_assert_eq!(visible.len(), count(&owner));
            prop_assert!(visible.iter().all(|r| r.owner_id() == &owner));
        }

        let removed = tables.delete(&Scope::Owner(alice.clone()), Table::Tasks, &[]);
        prop_assert_eq!(removed, count(&alice) as u64);
        prop_assert_eq!(tables.len(Table::Tasks), rows.len() - count(&alice));
    }

    // --- patches ---

    #[test]
    fn rejected_patch_changes_nothing(
        rows in prop::collection::vec(arb_row(), 1..16),
        position in any::<i64>(),
        immutable in prop_oneof![Just(Field::Id), Just(Field::OwnerId), Just(Field::CreatedAt)],
    ) {
        let (mut tables, _) = populate(&rows);
        let before = all_tasks(&tables);

        let patch = Patch::new()
            .set(Field::Position, position)
            .set(immutable, Value::Null);
        let result = tables.update(&Scope::Service, Table::Tasks, &patch, &[]);

        prop_assert!(result.is_err());
        prop_assert_eq!(all_tasks(&tables), before);
    }

    // --- recurring reset ---

    #[test]
    fn reset_clears_only_completed_habits(rows in prop::collection::vec(arb_row(), 0..24)) {
        let (mut tables, _) = populate(&rows);
        let before = all_tasks(&tables);
        let habits_done = before.iter().filter(|t| t.recurring && t.completed).count();

        prop_assert_eq!(tables.reset_recurring().unwrap(), habits_done as u64);
        prop_assert_eq!(tables.reset_recurring().unwrap(), 0);

        let after = all_tasks(&tables);
        for (old, new) in before.iter().zip(&after) {
            prop_assert_eq!(&old.id, &new.id);
            if old.recurring {
                prop_assert!(!new.completed);
                prop_assert_eq!(new.completed_at, None);
            } else {
                prop_assert_eq!(old, new);
            }
        }
    }

    // --- filters ---

    #[test]
    fn filters_agree_with_fields(task in arb_task(), wanted in any::<bool>(), bound in arb_time()) {
        let record = Record::Task(task.clone());

        prop_assert_eq!(
            Filter::eq(Field::Completed, wanted).matches(&record),
            task.completed == wanted
        );
        prop_assert_eq!(
            Filter::eq(Field::CompletedAt, Value::Null).matches(&record),
            task.completed_at.is_none()
        );
        prop_assert_eq!(
            Filter::gte(Field::CompletedAt, bound).matches(&record),
            task.completed_at.is_some_and(|at| at >= bound)
        );
        prop_assert_eq!(
            Filter::lte(Field::CompletedAt, bound).matches(&record),
            task.completed_at.is_some_and(|at| at <= bound)
        );
        // a text value never matches a boolean column
        prop_assert!(!Filter::eq(Field::Completed, "true").matches(&record));
    }
}
