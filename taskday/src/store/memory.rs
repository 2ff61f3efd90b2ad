//! In-memory store for tests and offline use.
//!
//! [`MemoryStore`] wraps the shared record engine behind a lock and binds
//! it to one owner. Several stores can share the same tables (one per
//! owner) to exercise row-level ownership and the recurring reset, which
//! runs across all owners.
//!
//! Faults can be injected so that the failure paths of the ledger
//! (single-record rollback, reorder reconciliation, degraded notification
//! fetch) can be driven deterministically.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use taskday_proto::store::{Draft, Field, Filter, Order, Patch, Record, Scope, Table, Tables};
use taskday_proto::task::{OwnerId, Task};

use super::{Store, StoreError};

/// Pending injected failures.
#[derive(Debug, Default)]
struct Faults {
    /// Fail this many upcoming updates, then recover.
    failing_updates: usize,
    /// Let this many updates succeed, then fail every later one.
    updates_until_failure: Option<usize>,
    fail_selects: bool,
    fail_deletes: bool,
    /// Fail inserts into this table.
    failing_inserts: Option<Table>,
}

/// An owner-scoped view over shared in-memory tables.
///
/// Cloning yields a handle to the same tables, owner, and fault state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    owner: OwnerId,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    /// Creates a store over fresh empty tables.
    #[must_use]
    pub fn new(owner: OwnerId) -> Self {
        Self::shared(Arc::new(RwLock::new(Tables::new())), owner)
    }

    /// Creates a store over existing tables.
    #[must_use]
    pub fn shared(tables: Arc<RwLock<Tables>>, owner: OwnerId) -> Self {
        Self {
            tables,
            owner,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Returns a store for another owner over the same tables, with its own
    /// fault state.
    #[must_use]
    pub fn for_owner(&self, owner: OwnerId) -> Self {
        Self::shared(Arc::clone(&self.tables), owner)
    }

    /// Returns the owner this store is scoped to.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns a handle to the underlying tables.
    #[must_use]
    pub fn tables(&self) -> Arc<RwLock<Tables>> {
        Arc::clone(&self.tables)
    }

    /// Runs the recurring reset across every owner sharing these tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] if the engine refuses the update.
    pub fn reset_recurring(&self) -> Result<u64, StoreError> {
        let count = self.tables.write().reset_recurring()?;
        tracing::info!(count, "recurring tasks reset");
        Ok(count)
    }

    /// Returns this owner's stored tasks in position order, bypassing any
    /// injected faults.
    #[must_use]
    pub fn stored_tasks(&self) -> Vec<Task> {
        self.tables
            .read()
            .select(&self.scope(), Table::Tasks, &[], Some(Order::asc(Field::Position)))
            .into_iter()
            .filter_map(Record::into_task)
            .collect()
    }

    /// Makes the next `n` updates fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.faults.lock().failing_updates = n;
    }

    /// Lets `k` more updates succeed, then fails every update until
    /// [`clear_faults`](Self::clear_faults) is called.
    pub fn fail_updates_after(&self, k: usize) {
        self.faults.lock().updates_until_failure = Some(k);
    }

    /// Makes every select fail while `on` is true.
    pub fn fail_selects(&self, on: bool) {
        self.faults.lock().fail_selects = on;
    }

    /// Makes every delete fail while `on` is true.
    pub fn fail_deletes(&self, on: bool) {
        self.faults.lock().fail_deletes = on;
    }

    /// Makes inserts into `table` fail.
    pub fn fail_inserts_into(&self, table: Table) {
        self.faults.lock().failing_inserts = Some(table);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn scope(&self) -> Scope {
        Scope::Owner(self.owner.clone())
    }

    fn check_update(&self) -> Result<(), StoreError> {
        let mut faults = self.faults.lock();
        if faults.failing_updates > 0 {
            faults.failing_updates -= 1;
            return Err(StoreError::Unavailable("injected update failure".into()));
        }
        if let Some(remaining) = faults.updates_until_failure.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::Unavailable("injected update failure".into()));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Record>, StoreError> {
        if self.faults.lock().fail_selects {
            return Err(StoreError::Unavailable("injected select failure".into()));
        }
        Ok(self.tables.read().select(&self.scope(), table, filters, order))
    }

    async fn insert(&self, draft: Draft) -> Result<Record, StoreError> {
        if self.faults.lock().failing_inserts == Some(draft.table()) {
            return Err(StoreError::Unavailable("injected insert failure".into()));
        }
        Ok(self.tables.write().insert(&self.scope(), draft)?)
    }

    async fn update(
        &self,
        table: Table,
        patch: &Patch,
        filters: &[Filter],
    ) -> Result<u64, StoreError> {
        self.check_update()?;
        Ok(self
            .tables
            .write()
            .update(&self.scope(), table, patch, filters)?)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        if self.faults.lock().fail_deletes {
            return Err(StoreError::Unavailable("injected delete failure".into()));
        }
        Ok(self.tables.write().delete(&self.scope(), table, filters))
    }
}
