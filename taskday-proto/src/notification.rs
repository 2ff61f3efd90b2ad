//! Notification model.
//!
//! Notifications are created as a side effect of task mutations and are only
//! ever changed by flipping `read`, or removed individually or in bulk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::OwnerId;

/// Unique identifier for a notification (UUID v7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new time-ordered notification identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NotificationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Something the user did succeeded.
    Success,
    /// Neutral information.
    Info,
    /// Something needs attention.
    Warning,
}

impl NotificationKind {
    /// Returns the lowercase name used in storage and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Short headline.
    pub title: String,
    /// Detail line.
    pub message: String,
    /// Severity.
    pub kind: NotificationKind,
    /// Whether the user has seen it.
    pub read: bool,
    /// When it was emitted.
    pub timestamp: DateTime<Utc>,
}

/// A notification before the store has assigned its generated fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    /// Short headline.
    pub title: String,
    /// Detail line.
    pub message: String,
    /// Severity.
    pub kind: NotificationKind,
    /// When it was emitted.
    pub timestamp: DateTime<Utc>,
}

impl NotificationDraft {
    /// Materializes the draft into an unread [`Notification`].
    #[must_use]
    pub fn into_notification(self, id: NotificationId, owner_id: OwnerId) -> Notification {
        Notification {
            id,
            owner_id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            read: false,
            timestamp: self.timestamp,
        }
    }
}
