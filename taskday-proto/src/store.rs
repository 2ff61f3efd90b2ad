//! Generic record store engine.
//!
//! Implements the select / insert / update / delete contract over two
//! in-memory tables with equality and range filters, single-field ordering,
//! and row-level ownership. The server wraps a [`Tables`] behind a lock; the
//! client's in-memory store does the same for tests and offline use.
//!
//! # Ordering
//!
//! Rows are kept in insertion order and sorting is stable, so records with
//! equal sort keys come back in the order they were inserted.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::{Notification, NotificationDraft, NotificationId, NotificationKind};
use crate::task::{OwnerId, Task, TaskDraft, TaskId};

/// Errors raised by the record engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The field does not exist on the table.
    #[error("table {table} has no field {field}")]
    UnknownField {
        /// Table addressed.
        table: Table,
        /// Field requested.
        field: Field,
    },
    /// The field is generated or set once and cannot be patched.
    #[error("field {0} is immutable")]
    ImmutableField(Field),
    /// The value's type does not fit the field.
    #[error("value {value:?} does not fit field {field}")]
    TypeMismatch {
        /// Field being assigned.
        field: Field,
        /// Offending value.
        value: Value,
    },
    /// Inserts need an owner to stamp on the new row.
    #[error("insert requires an owner scope")]
    OwnerRequired,
}

/// The two tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Task records.
    Tasks,
    /// Notification records.
    Notifications,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tasks => f.write_str("tasks"),
            Self::Notifications => f.write_str("notifications"),
        }
    }
}

/// Named columns across both tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Id,
    OwnerId,
    Title,
    Completed,
    Recurring,
    CreatedAt,
    CompletedAt,
    Position,
    Message,
    Kind,
    Read,
    Timestamp,
}

impl Field {
    const fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::OwnerId => "owner_id",
            Self::Title => "title",
            Self::Completed => "completed",
            Self::Recurring => "recurring",
            Self::CreatedAt => "created_at",
            Self::CompletedAt => "completed_at",
            Self::Position => "position",
            Self::Message => "message",
            Self::Kind => "kind",
            Self::Read => "read",
            Self::Timestamp => "timestamp",
        }
    }

    const fn is_immutable(self) -> bool {
        matches!(
            self,
            Self::Id | Self::OwnerId | Self::CreatedAt | Self::Timestamp
        )
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Absent optional value.
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl Value {
    /// Compares two values of the same type. Mismatched types are unordered.
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(Self::Null, Self::Time)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&TaskId> for Value {
    fn from(v: &TaskId) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&NotificationId> for Value {
    fn from(v: &NotificationId) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&OwnerId> for Value {
    fn from(v: &OwnerId) -> Self {
        Self::Text(v.as_str().to_string())
    }
}

/// A row predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Field equals value. `Eq(field, Null)` matches an absent optional field.
    Eq(Field, Value),
    /// Field is greater than or equal to value.
    Gte(Field, Value),
    /// Field is less than or equal to value.
    Lte(Field, Value),
}

impl Filter {
    /// Equality filter.
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::Eq(field, value.into())
    }

    /// Lower-bound filter (inclusive).
    pub fn gte(field: Field, value: impl Into<Value>) -> Self {
        Self::Gte(field, value.into())
    }

    /// Upper-bound filter (inclusive).
    pub fn lte(field: Field, value: impl Into<Value>) -> Self {
        Self::Lte(field, value.into())
    }

    /// Returns true if `record` satisfies this filter.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Eq(field, value) => record
                .get(*field)
                .is_some_and(|v| v.compare(value) == Some(Ordering::Equal)),
            Self::Gte(field, value) => Self::ranged(record, *field, value, |o| o.is_ge()),
            Self::Lte(field, value) => Self::ranged(record, *field, value, |o| o.is_le()),
        }
    }

    fn ranged(record: &Record, field: Field, bound: &Value, ok: fn(Ordering) -> bool) -> bool {
        if bound.is_null() {
            return false;
        }
        record
            .get(field)
            .filter(|v| !v.is_null())
            .and_then(|v| v.compare(bound))
            .is_some_and(ok)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single-field ordering for a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Field to sort on.
    pub field: Field,
    /// Sort direction.
    pub direction: Direction,
}

impl Order {
    /// Ascending order on `field`.
    #[must_use]
    pub const fn asc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
        }
    }

    /// Descending order on `field`.
    #[must_use]
    pub const fn desc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Descending,
        }
    }

    /// Nulls sort first ascending and last descending; mismatched types
    /// compare equal so the stable sort leaves them in insertion order.
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = match (a.get(self.field), b.get(self.field)) {
            (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
            (Some(Value::Null) | None, Some(_)) => Ordering::Less,
            (Some(_), Some(Value::Null) | None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
        };
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

/// A set of field assignments applied by an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch(pub Vec<(Field, Value)>);

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds an assignment.
    #[must_use]
    pub fn set(mut self, field: Field, value: impl Into<Value>) -> Self {
        self.0.push((field, value.into()));
        self
    }

    /// Returns true if the patch assigns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A row of either table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Task(Task),
    Notification(Notification),
}

impl Record {
    /// Returns the table this record lives in.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Task(_) => Table::Tasks,
            Self::Notification(_) => Table::Notifications,
        }
    }

    /// Returns the owner of this record.
    #[must_use]
    pub const fn owner_id(&self) -> &OwnerId {
        match self {
            Self::Task(t) => &t.owner_id,
            Self::Notification(n) => &n.owner_id,
        }
    }

    /// Unwraps a task record.
    #[must_use]
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(t) => Some(t),
            Self::Notification(_) => None,
        }
    }

    /// Unwraps a notification record.
    #[must_use]
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            Self::Notification(n) => Some(n),
            Self::Task(_) => None,
        }
    }

    /// Reads a field. Returns `None` if the field does not exist on this
    /// record's table and `Some(Value::Null)` for an absent optional value.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<Value> {
        match self {
            Self::Task(t) => match field {
                Field::Id => Some(Value::from(&t.id)),
                Field::OwnerId => Some(Value::from(&t.owner_id)),
                Field::Title => Some(Value::Text(t.title.clone())),
                Field::Completed => Some(Value::Bool(t.completed)),
                Field::Recurring => Some(Value::Bool(t.recurring)),
                Field::CreatedAt => Some(Value::Time(t.created_at)),
                Field::CompletedAt => Some(Value::from(t.completed_at)),
                Field::Position => Some(Value::Int(t.position)),
                _ => None,
            },
            Self::Notification(n) => match field {
                Field::Id => Some(Value::from(&n.id)),
                Field::OwnerId => Some(Value::from(&n.owner_id)),
                Field::Title => Some(Value::Text(n.title.clone())),
                Field::Message => Some(Value::Text(n.message.clone())),
                Field::Kind => Some(Value::Text(n.kind.as_str().to_string())),
                Field::Read => Some(Value::Bool(n.read)),
                Field::Timestamp => Some(Value::Time(n.timestamp)),
                _ => None,
            },
        }
    }

    /// Assigns a mutable field.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ImmutableField`] for generated or set-once
    /// fields, [`EngineError::UnknownField`] if the table lacks the field,
    /// and [`EngineError::TypeMismatch`] if the value does not fit.
    pub fn set(&mut self, field: Field, value: Value) -> Result<(), EngineError> {
        if field.is_immutable() {
            return Err(EngineError::ImmutableField(field));
        }
        let table = self.table();
        let mismatch = |value: Value| EngineError::TypeMismatch { field, value };
        match self {
            Self::Task(t) => match (field, value) {
                (Field::Title, Value::Text(s)) => t.title = s,
                (Field::Completed, Value::Bool(b)) => t.completed = b,
                (Field::Recurring, Value::Bool(b)) => t.recurring = b,
                (Field::CompletedAt, Value::Time(at)) => t.completed_at = Some(at),
                (Field::CompletedAt, Value::Null) => t.completed_at = None,
                (Field::Position, Value::Int(p)) => t.position = p,
                (Field::Title | Field::Completed | Field::Recurring, v)
                | (Field::CompletedAt | Field::Position, v) => return Err(mismatch(v)),
                (field, _) => return Err(EngineError::UnknownField { table, field }),
            },
            Self::Notification(n) => match (field, value) {
                (Field::Title, Value::Text(s)) => n.title = s,
                (Field::Message, Value::Text(s)) => n.message = s,
                (Field::Read, Value::Bool(b)) => n.read = b,
                (Field::Kind, Value::Text(s)) => {
                    n.kind = match s.as_str() {
                        "success" => NotificationKind::Success,
                        "info" => NotificationKind::Info,
                        "warning" => NotificationKind::Warning,
                        _ => return Err(mismatch(Value::Text(s))),
                    };
                }
                (Field::Title | Field::Message | Field::Read | Field::Kind, v) => {
                    return Err(mismatch(v));
                }
                (field, _) => return Err(EngineError::UnknownField { table, field }),
            },
        }
        Ok(())
    }

    fn apply(&mut self, patch: &Patch) -> Result<(), EngineError> {
        for (field, value) in &patch.0 {
            self.set(*field, value.clone())?;
        }
        Ok(())
    }
}

/// A new row before the store assigns generated fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Draft {
    Task(TaskDraft),
    Notification(NotificationDraft),
}

impl Draft {
    /// Returns the table the draft is inserted into.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Task(_) => Table::Tasks,
            Self::Notification(_) => Table::Notifications,
        }
    }
}

/// Whose rows an operation may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Restricted to one owner's rows; inserts are stamped with this owner.
    Owner(OwnerId),
    /// Unrestricted; used by the scheduled reset job only.
    Service,
}

impl Scope {
    fn admits(&self, record: &Record) -> bool {
        match self {
            Self::Owner(owner) => record.owner_id() == owner,
            Self::Service => true,
        }
    }
}

/// In-memory tables implementing the record store contract.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tables {
    tasks: Vec<Record>,
    notifications: Vec<Record>,
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn rows(&self, table: Table) -> &Vec<Record> {
        match table {
            Table::Tasks => &self.tasks,
            Table::Notifications => &self.notifications,
        }
    }

    const fn rows_mut(&mut self, table: Table) -> &mut Vec<Record> {
        match table {
            Table::Tasks => &mut self.tasks,
            Table::Notifications => &mut self.notifications,
        }
    }

    /// Total number of rows in a table, across all owners.
    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        self.rows(table).len()
    }

    /// Returns true if both tables are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.notifications.is_empty()
    }

    /// Returns the rows visible to `scope` that match every filter, sorted
    /// by `order` if given.
    #[must_use]
    pub fn select(
        &self,
        scope: &Scope,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Vec<Record> {
        let mut out: Vec<Record> = self
            .rows(table)
            .iter()
            .filter(|r| scope.admits(r) && filters.iter().all(|f| f.matches(r)))
            .cloned()
            .collect();
        if let Some(order) = order {
            out.sort_by(|a, b| order.compare(a, b));
        }
        out
    }

    /// Inserts a draft, assigning a fresh id and the scope's owner.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OwnerRequired`] under [`Scope::Service`].
    pub fn insert(&mut self, scope: &Scope, draft: Draft) -> Result<Record, EngineError> {
        let Scope::Owner(owner) = scope else {
            return Err(EngineError::OwnerRequired);
        };
        let record = match draft {
            Draft::Task(d) => Record::Task(d.into_task(TaskId::new(), owner.clone())),
            Draft::Notification(d) => {
                Record::Notification(d.into_notification(NotificationId::new(), owner.clone()))
            }
        };
        self.rows_mut(record.table()).push(record.clone());
        Ok(record)
    }

    /// Applies `patch` to every visible row matching `filters`, returning
    /// the number of rows changed.
    ///
    /// The patch is applied to copies first; if any assignment is rejected
    /// no row is modified.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] raised by an assignment.
    pub fn update(
        &mut self,
        scope: &Scope,
        table: Table,
        patch: &Patch,
        filters: &[Filter],
    ) -> Result<u64, EngineError> {
        let rows = self.rows_mut(table);
        let mut staged = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if scope.admits(row) && filters.iter().all(|f| f.matches(row)) {
                let mut copy = row.clone();
                copy.apply(patch)?;
                staged.push((idx, copy));
            }
        }
        let changed = staged.len() as u64;
        for (idx, copy) in staged {
            rows[idx] = copy;
        }
        Ok(changed)
    }

    /// Removes every visible row matching `filters`, returning the count.
    pub fn delete(&mut self, scope: &Scope, table: Table, filters: &[Filter]) -> u64 {
        let rows = self.rows_mut(table);
        let before = rows.len();
        rows.retain(|r| !(scope.admits(r) && filters.iter().all(|f| f.matches(r))));
        (before - rows.len()) as u64
    }

    /// Clears the completed state of every completed recurring task across
    /// all owners. Idempotent: a second run changes nothing.
    ///
    /// # Errors
    ///
    /// Propagates [`EngineError`] from the underlying update.
    pub fn reset_recurring(&mut self) -> Result<u64, EngineError> {
        self.update(
            &Scope::Service,
            Table::Tasks,
            &recurring_reset_patch(),
            &recurring_reset_filters(),
        )
    }
}

/// The assignments performed by the recurring reset trigger.
#[must_use]
pub fn recurring_reset_patch() -> Patch {
    Patch::new()
        .set(Field::Completed, false)
        .set(Field::CompletedAt, Value::Null)
}

/// The rows targeted by the recurring reset trigger.
#[must_use]
pub fn recurring_reset_filters() -> Vec<Filter> {
    vec![
        Filter::eq(Field::Recurring, true),
        Filter::eq(Field::Completed, true),
    ]
}
