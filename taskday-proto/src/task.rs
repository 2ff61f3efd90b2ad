//! Task model for `taskday`.
//!
//! A [`Task`] is owned by exactly one [`OwnerId`] and belongs to one of two
//! ordering partitions (see [`Partition`]). The completion invariant is that
//! `completed_at` is present if and only if `completed` is true.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters (after trimming).
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifies the user who owns a record.
///
/// Opaque to the core: it is whatever stable identifier the auth provider
/// yields for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this owner identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two independently ordered subsets of a user's tasks.
///
/// Membership is a predicate, not a tag: a recurring task is always in
/// [`Partition::Recurring`] whatever its completion state, and a
/// non-recurring task is in [`Partition::Active`] only while incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Non-recurring tasks that are not yet completed.
    Active,
    /// Tasks flagged as daily habits.
    Recurring,
}

impl Partition {
    /// Returns true if `task` belongs to this partition.
    #[must_use]
    pub const fn contains(self, task: &Task) -> bool {
        match self {
            Self::Active => !task.recurring && !task.completed,
            Self::Recurring => task.recurring,
        }
    }

    /// Returns the partition name used on the command line and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Recurring => "recurring",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" | "today" => Ok(Self::Active),
            "recurring" => Ok(Self::Recurring),
            other => Err(format!(
                "invalid partition '{other}': must be active or recurring"
            )),
        }
    }
}

/// A task record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, immutable identifier.
    pub id: TaskId,
    /// Owning user; every query and mutation is scoped to this value.
    pub owner_id: OwnerId,
    /// Trimmed, non-empty title.
    pub title: String,
    /// Whether the task is currently completed.
    pub completed: bool,
    /// Whether the task is a daily habit reset by the recurring trigger.
    pub recurring: bool,
    /// Creation time, never mutated.
    pub created_at: DateTime<Utc>,
    /// Completion time; present iff `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Display order key within the task's partition.
    pub position: i64,
}

impl Task {
    /// Returns true if the completion invariant holds for this task.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some()
    }

    /// Points this task is worth when completed: 2 for a recurring habit,
    /// 1 otherwise.
    #[must_use]
    pub const fn score_weight(&self) -> u64 {
        if self.recurring { 2 } else { 1 }
    }
}

/// A task before the store has assigned its generated fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Trimmed, non-empty title.
    pub title: String,
    /// Whether the task is a daily habit.
    pub recurring: bool,
    /// Creation time chosen by the caller.
    pub created_at: DateTime<Utc>,
    /// Initial position within the task's partition.
    pub position: i64,
}

impl TaskDraft {
    /// Materializes the draft into a full incomplete [`Task`].
    #[must_use]
    pub fn into_task(self, id: TaskId, owner_id: OwnerId) -> Task {
        Task {
            id,
            owner_id,
            title: self.title,
            completed: false,
            recurring: self.recurring,
            created_at: self.created_at,
            completed_at: None,
            position: self.position,
        }
    }
}
