//! Derived views over a set of tasks.
//!
//! All views are projections over the same task set: a recurring task
//! shows up in both [`today`] and [`recurring`]. Sorting is stable, so tasks
//! with equal keys keep their relative order in the input.

use chrono::{FixedOffset, NaiveDate};
use taskday_proto::task::{Partition, Task, TaskId};

/// Tasks created and completed on one local calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayTasks {
    /// Tasks whose `created_at` falls on the day, oldest first.
    pub created: Vec<Task>,
    /// Tasks whose `completed_at` falls on the day, earliest first.
    pub completed: Vec<Task>,
}

/// Open one-off tasks and every recurring task, by ascending position.
#[must_use]
pub fn today(tasks: &[Task]) -> Vec<&Task> {
    by_position(tasks.iter().filter(|t| t.recurring || !t.completed))
}

/// Recurring tasks, by ascending position.
#[must_use]
pub fn recurring(tasks: &[Task]) -> Vec<&Task> {
    by_position(tasks.iter().filter(|t| t.recurring))
}

/// Tasks in `partition`, by ascending position.
#[must_use]
pub fn partition(tasks: &[Task], partition: Partition) -> Vec<&Task> {
    by_position(tasks.iter().filter(|t| partition.contains(t)))
}

/// Ids of the tasks in `partition`, in display order.
#[must_use]
pub fn partition_ids(tasks: &[Task], which: Partition) -> Vec<TaskId> {
    partition(tasks, which).into_iter().map(|t| t.id.clone()).collect()
}

/// Completed tasks, most recently completed first.
#[must_use]
pub fn history(tasks: &[Task]) -> Vec<&Task> {
    let mut out: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
    out.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    out
}

/// Splits tasks by whether they were created or completed on `date`, as
/// seen from `offset`.
#[must_use]
pub fn on_date(tasks: &[Task], date: NaiveDate, offset: FixedOffset) -> DayTasks {
    let local_day = |at: chrono::DateTime<chrono::Utc>| at.with_timezone(&offset).date_naive();

    let mut created: Vec<Task> = tasks
        .iter()
        .filter(|t| local_day(t.created_at) == date)
        .cloned()
        .collect();
    created.sort_by_key(|t| t.created_at);

    let mut completed: Vec<Task> = tasks
        .iter()
        .filter(|t| t.completed_at.is_some_and(|at| local_day(at) == date))
        .cloned()
        .collect();
    completed.sort_by_key(|t| t.completed_at);

    DayTasks { created, completed }
}

/// Percentage of the today view that is completed, rounded half up.
/// An empty view is 0%.
#[must_use]
pub fn progress(tasks: &[Task]) -> u32 {
    let view = today(tasks);
    let total = view.len() as u64;
    if total == 0 {
        return 0;
    }
    let done = view.iter().filter(|t| t.completed).count() as u64;
    u32::try_from((done * 200 + total) / (total * 2)).unwrap_or(100)
}

fn by_position<'a>(iter: impl Iterator<Item = &'a Task>) -> Vec<&'a Task> {
    let mut out: Vec<&Task> = iter.collect();
    out.sort_by_key(|t| t.position);
    out
}
