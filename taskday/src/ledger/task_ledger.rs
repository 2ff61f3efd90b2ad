//! The per-user task ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use futures_util::future::join_all;

use taskday_proto::notification::{NotificationDraft, NotificationKind};
use taskday_proto::store::{Draft, Field, Filter, Order, Patch, Record, Table};
use taskday_proto::task::{MAX_TASK_TITLE_LENGTH, OwnerId, Partition, Task, TaskDraft, TaskId};

use super::views::{self, DayTasks};
use super::{LedgerError, ValidationError};
use crate::clock::Clock;
use crate::report::{MAX_BREAKDOWN_WEEKS, Period, PeriodReport, ReportCaps, ScoreAggregator, WeekReport};
use crate::session::Session;
use crate::store::{Store, StoreError};

/// One user's tasks, cached over a [`Store`].
///
/// Single-record mutations (add, toggle, delete) write to the store first
/// and only touch the cache once the write succeeded. Reorder is the
/// exception: it renumbers the cache immediately, then writes every new
/// position, and reloads the partition if any write fails.
pub struct TaskLedger<S: Store> {
    store: S,
    owner: OwnerId,
    clock: Arc<dyn Clock>,
    aggregator: ScoreAggregator,
    offset: FixedOffset,
    max_title_len: usize,
    tasks: Vec<Task>,
}

impl<S: Store> TaskLedger<S> {
    /// Opens the ledger for the session's user and loads their tasks.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthenticated`] without a signed-in user, or
    /// [`LedgerError::Store`] if the initial load fails.
    pub async fn open(
        store: S,
        session: &Session,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Result<Self, LedgerError> {
        let owner = session.owner().cloned().ok_or(LedgerError::Unauthenticated)?;
        let mut ledger = Self {
            store,
            owner,
            clock,
            aggregator: ScoreAggregator::new(offset, ReportCaps::default()),
            offset,
            max_title_len: MAX_TASK_TITLE_LENGTH,
            tasks: Vec::new(),
        };
        ledger.reload().await?;
        tracing::info!(owner = %ledger.owner, tasks = ledger.tasks.len(), "ledger opened");
        Ok(ledger)
    }

    /// Overrides the maximum title length.
    #[must_use]
    pub fn with_max_title_len(mut self, max: usize) -> Self {
        self.max_title_len = max;
        self
    }

    /// Overrides the report reference caps.
    #[must_use]
    pub fn with_report_caps(mut self, caps: ReportCaps) -> Self {
        self.aggregator = ScoreAggregator::new(self.offset, caps);
        self
    }

    /// Returns the owner this ledger belongs to.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the viewer's UTC offset.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Returns the local calendar day according to the ledger's clock.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.offset).date_naive()
    }

    /// Returns every cached task in load order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns a cached task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Discards the cache and reads every task back from the store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the read fails; the cache is left
    /// as it was.
    pub async fn reload(&mut self) -> Result<(), LedgerError> {
        let records = self
            .store
            .select(Table::Tasks, &[], Some(Order::asc(Field::Position)))
            .await?;
        self.tasks = into_tasks(records)?;
        tracing::debug!(owner = %self.owner, tasks = self.tasks.len(), "ledger reloaded");
        Ok(())
    }

    // --- mutations ---

    /// Adds a task at the end of its partition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] or
    /// [`ValidationError::TitleTooLong`] for a bad title, or
    /// [`LedgerError::Store`] if the insert fails.
    pub async fn add_task(&mut self, title: &str, recurring: bool) -> Result<Task, LedgerError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleEmpty.into());
        }
        let len = title.chars().count();
        if len > self.max_title_len {
            return Err(ValidationError::TitleTooLong {
                len,
                max: self.max_title_len,
            }
            .into());
        }

        // Completed one-offs keep their position and may be reopened, so
        // they count towards the next free slot.
        let position = self
            .tasks
            .iter()
            .filter(|t| t.recurring == recurring)
            .map(|t| t.position)
            .max()
            .map_or(0, |p| p + 1);

        let draft = TaskDraft {
            title: title.to_string(),
            recurring,
            created_at: self.clock.now(),
            position,
        };
        let record = self.store.insert(Draft::Task(draft)).await?;
        let task = record
            .into_task()
            .ok_or_else(|| StoreError::Protocol("insert into tasks returned another record".into()))?;

        tracing::info!(task_id = %task.id, position, recurring, "task added");
        self.tasks.push(task.clone());
        self.notify(NotificationKind::Success, "Task added", task.title.clone())
            .await;
        Ok(task)
    }

    /// Flips a task between open and completed.
    ///
    /// Completing stamps `completed_at` with the current time and emits a
    /// notification; reopening clears it silently. Position is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the task is unknown or no longer
    /// stored, or [`LedgerError::Store`] if the write fails.
    pub async fn toggle_task(&mut self, id: &TaskId) -> Result<Task, LedgerError> {
        let idx = self.index_of(id)?;
        let completed = !self.tasks[idx].completed;
        let completed_at = completed.then(|| self.clock.now());

        let patch = Patch::new()
            .set(Field::Completed, completed)
            .set(Field::CompletedAt, completed_at);
        let changed = self
            .store
            .update(Table::Tasks, &patch, &[Filter::eq(Field::Id, id)])
            .await?;
        if changed == 0 {
            return Err(self.forget(idx));
        }

        let task = &mut self.tasks[idx];
        task.completed = completed;
        task.completed_at = completed_at;
        let task = task.clone();
        tracing::info!(task_id = %id, completed, "task toggled");

        if completed {
            self.notify(NotificationKind::Success, "Task completed", task.title.clone())
                .await;
        }
        Ok(task)
    }

    /// Removes a task, whether open or completed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the task is unknown or no longer
    /// stored, or [`LedgerError::Store`] if the delete fails.
    pub async fn delete_task(&mut self, id: &TaskId) -> Result<(), LedgerError> {
        let idx = self.index_of(id)?;
        let removed = self
            .store
            .delete(Table::Tasks, &[Filter::eq(Field::Id, id)])
            .await?;
        if removed == 0 {
            return Err(self.forget(idx));
        }

        let task = self.tasks.remove(idx);
        tracing::info!(task_id = %id, "task deleted");
        self.notify(
            NotificationKind::Info,
            "Task deleted",
            format!("\"{}\" was removed", task.title),
        )
        .await;
        Ok(())
    }

    /// Puts the tasks of `partition` in the order given and renumbers their
    /// positions from 0.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAPermutation`] if `ordered_ids` is not
    /// exactly the partition's ids. Returns [`LedgerError::Reconciled`] if a
    /// position write failed and the partition was reloaded, or
    /// [`LedgerError::Store`] if that reload failed too.
    pub async fn reorder(
        &mut self,
        partition: Partition,
        ordered_ids: &[TaskId],
    ) -> Result<(), LedgerError> {
        let current = views::partition_ids(&self.tasks, partition);
        check_permutation(partition, &current, ordered_ids)?;

        for (position, id) in (0_i64..).zip(ordered_ids) {
            if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) {
                task.position = position;
            }
        }

        let writes: Vec<(Patch, [Filter; 1])> = (0_i64..)
            .zip(ordered_ids)
            .map(|(position, id)| {
                (
                    Patch::new().set(Field::Position, position),
                    [Filter::eq(Field::Id, id)],
                )
            })
            .collect();
        let results = join_all(
            writes
                .iter()
                .map(|(patch, filter)| self.store.update(Table::Tasks, patch, filter)),
        )
        .await;

        let failure = results.into_iter().zip(ordered_ids).find_map(|(r, id)| match r {
            Ok(0) => Some(StoreError::Rejected(format!("task {id} is no longer stored"))),
            Ok(_) => None,
            Err(e) => Some(e),
        });

        match failure {
            None => {
                tracing::info!(%partition, count = ordered_ids.len(), "tasks reordered");
                Ok(())
            }
            Some(source) => {
                tracing::warn!(%partition, err = %source, "reorder write failed, reloading partition");
                self.reload_partition(partition).await?;
                Err(LedgerError::Reconciled { partition, source })
            }
        }
    }

    // --- views ---

    /// Open one-off tasks and all recurring tasks, by position.
    #[must_use]
    pub fn view_today(&self) -> Vec<&Task> {
        views::today(&self.tasks)
    }

    /// Recurring tasks, by position.
    #[must_use]
    pub fn view_recurring(&self) -> Vec<&Task> {
        views::recurring(&self.tasks)
    }

    /// Completed tasks, most recent first.
    #[must_use]
    pub fn view_history(&self) -> Vec<&Task> {
        views::history(&self.tasks)
    }

    /// Tasks created and completed on the local day `date`.
    #[must_use]
    pub fn tasks_on_date(&self, date: NaiveDate) -> DayTasks {
        views::on_date(&self.tasks, date, self.offset)
    }

    /// Percentage of the today view that is completed.
    #[must_use]
    pub fn progress(&self) -> u32 {
        views::progress(&self.tasks)
    }

    // --- reports ---

    /// Scores the `period` containing the local day `today`, reading the
    /// completed tasks of that window from the store.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DateOutOfRange`] if the window cannot be
    /// represented, or [`LedgerError::Store`] if the query fails.
    pub async fn report(&self, period: Period, today: NaiveDate) -> Result<PeriodReport, LedgerError> {
        let out_of_range = || ValidationError::DateOutOfRange(today);
        let (start, end) = self
            .aggregator
            .period_window(period, today)
            .ok_or_else(out_of_range)?;
        let tasks = self.completed_between(start, end).await?;
        Ok(self
            .aggregator
            .report(&tasks, period, today)
            .ok_or_else(out_of_range)?)
    }

    /// Scores `week_count` weeks starting at `month_start`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TooManyWeeks`] above
    /// [`MAX_BREAKDOWN_WEEKS`], [`ValidationError::DateOutOfRange`] if a
    /// window cannot be represented, or [`LedgerError::Store`] if the query
    /// fails.
    pub async fn weekly_breakdown(
        &self,
        month_start: NaiveDate,
        week_count: u32,
    ) -> Result<Vec<WeekReport>, LedgerError> {
        if week_count > MAX_BREAKDOWN_WEEKS {
            return Err(ValidationError::TooManyWeeks {
                requested: week_count,
                max: MAX_BREAKDOWN_WEEKS,
            }
            .into());
        }
        let out_of_range = || ValidationError::DateOutOfRange(month_start);
        let weeks = self
            .aggregator
            .weekly_breakdown(&[], month_start, week_count)
            .ok_or_else(out_of_range)?;
        let (Some(first), Some(last)) = (weeks.first(), weeks.last()) else {
            return Ok(weeks);
        };
        let tasks = self.completed_between(first.start, last.end).await?;
        Ok(self
            .aggregator
            .weekly_breakdown(&tasks, month_start, week_count)
            .ok_or_else(out_of_range)?)
    }

    // --- internals ---

    fn index_of(&self, id: &TaskId) -> Result<usize, LedgerError> {
        self.tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Drops a cached task the store no longer holds.
    fn forget(&mut self, idx: usize) -> LedgerError {
        let task = self.tasks.remove(idx);
        tracing::warn!(task_id = %task.id, "task no longer stored, dropped from cache");
        LedgerError::NotFound(task.id.to_string())
    }

    async fn completed_between(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Task>, LedgerError> {
        let filters = [
            Filter::eq(Field::Completed, true),
            Filter::gte(Field::CompletedAt, start),
            Filter::lte(Field::CompletedAt, end),
        ];
        let records = self.store.select(Table::Tasks, &filters, None).await?;
        into_tasks(records)
    }

    /// Replaces the cached members of `partition` with the stored ones.
    async fn reload_partition(&mut self, partition: Partition) -> Result<(), LedgerError> {
        let filters = match partition {
            Partition::Active => vec![
                Filter::eq(Field::Recurring, false),
                Filter::eq(Field::Completed, false),
            ],
            Partition::Recurring => vec![Filter::eq(Field::Recurring, true)],
        };
        let records = self
            .store
            .select(Table::Tasks, &filters, Some(Order::asc(Field::Position)))
            .await?;
        let fresh = into_tasks(records)?;
        self.tasks.retain(|t| !partition.contains(t));
        self.tasks.extend(fresh);
        tracing::info!(%partition, "partition reloaded from store");
        Ok(())
    }

    /// Records a notification. Failures are logged and otherwise ignored:
    /// the task mutation that caused it has already been stored.
    async fn notify(&self, kind: NotificationKind, title: &str, message: String) {
        let draft = NotificationDraft {
            title: title.to_string(),
            message,
            kind,
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.store.insert(Draft::Notification(draft)).await {
            tracing::warn!(err = %e, title, "failed to record notification");
        }
    }
}

fn into_tasks(records: Vec<Record>) -> Result<Vec<Task>, LedgerError> {
    records
        .into_iter()
        .map(|r| {
            r.into_task().ok_or_else(|| {
                LedgerError::from(StoreError::Protocol(
                    "tasks table returned another record".into(),
                ))
            })
        })
        .collect()
}

fn check_permutation(
    partition: Partition,
    current: &[TaskId],
    ordered: &[TaskId],
) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::NotAPermutation { partition, reason };
    if ordered.len() != current.len() {
        return Err(invalid(format!(
            "expected {} ids, got {}",
            current.len(),
            ordered.len()
        )));
    }
    let known: HashSet<&TaskId> = current.iter().collect();
    let mut seen = HashSet::with_capacity(ordered.len());
    for id in ordered {
        if !known.contains(id) {
            return Err(invalid(format!("{id} is not in the partition")));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("{id} appears more than once")));
        }
    }
    Ok(())
}
