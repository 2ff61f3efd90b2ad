//! Notification feed.
//!
//! Reads and manages the notifications the ledger emits. Fetching is a
//! degraded path: a store failure is logged and yields an empty feed rather
//! than an error.

use taskday_proto::notification::{Notification, NotificationId};
use taskday_proto::store::{Field, Filter, Order, Patch, Record, Table};
use taskday_proto::task::OwnerId;

use crate::ledger::LedgerError;
use crate::session::Session;
use crate::store::Store;

/// One user's notifications.
pub struct NotificationFeed<'a, S: Store> {
    store: &'a S,
    owner: OwnerId,
}

impl<'a, S: Store> NotificationFeed<'a, S> {
    /// Creates a feed for the session's user.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthenticated`] without a signed-in user.
    pub fn new(store: &'a S, session: &Session) -> Result<Self, LedgerError> {
        let owner = session.owner().cloned().ok_or(LedgerError::Unauthenticated)?;
        Ok(Self { store, owner })
    }

    /// Returns all notifications, newest first. Returns an empty list if the
    /// store cannot be read.
    pub async fn fetch(&self) -> Vec<Notification> {
        match self
            .store
            .select(Table::Notifications, &[], Some(Order::desc(Field::Timestamp)))
            .await
        {
            Ok(records) => records
                .into_iter()
                .filter_map(Record::into_notification)
                .collect(),
            Err(e) => {
                tracing::warn!(owner = %self.owner, err = %e, "failed to fetch notifications");
                Vec::new()
            }
        }
    }

    /// Marks one notification as read.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such notification exists, or
    /// [`LedgerError::Store`] if the write fails.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<(), LedgerError> {
        let changed = self
            .store
            .update(
                Table::Notifications,
                &Patch::new().set(Field::Read, true),
                &[Filter::eq(Field::Id, id)],
            )
            .await?;
        if changed == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Deletes one notification.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such notification exists, or
    /// [`LedgerError::Store`] if the delete fails.
    pub async fn delete(&self, id: &NotificationId) -> Result<(), LedgerError> {
        let removed = self
            .store
            .delete(Table::Notifications, &[Filter::eq(Field::Id, id)])
            .await?;
        if removed == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Deletes every notification and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the delete fails.
    pub async fn clear_all(&self) -> Result<u64, LedgerError> {
        let removed = self.store.delete(Table::Notifications, &[]).await?;
        tracing::info!(owner = %self.owner, removed, "notifications cleared");
        Ok(removed)
    }

    /// Counts the unread notifications in `notifications`.
    #[must_use]
    pub fn unread_count(notifications: &[Notification]) -> usize {
        notifications.iter().filter(|n| !n.read).count()
    }
}
