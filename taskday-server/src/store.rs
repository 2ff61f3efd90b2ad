//! Shared record tables served to every connection.
//!
//! The [`RecordStore`] holds the one copy of the task and notification
//! tables. Requests arriving on a connection are executed under that
//! connection's owner scope; the reset trigger runs under the service
//! scope.
//!
//! A store opened on a data file keeps a JSON snapshot of the tables there.
//! Every mutation that changes a row is applied to a copy, the copy is
//! written to disk, and only then does it replace the served tables, so a
//! failed write leaves both the file and the served state as they were.

use std::path::{Path, PathBuf};

use taskday_proto::protocol::{StoreOp, StoreReply};
use taskday_proto::store::{EngineError, Scope, Table, Tables};
use taskday_proto::task::OwnerId;
use tokio::sync::RwLock;

/// Errors raised by a [`RecordStore`] mutation or while opening one.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The engine rejected the operation; nothing was written.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The data file exists but could not be read.
    #[error("failed to read data file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The data file is not a valid table snapshot.
    #[error("data file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The snapshot could not be written; the change was discarded.
    #[error("failed to write data file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The tables could not be serialized.
    #[error("failed to serialize tables: {0}")]
    Serialize(serde_json::Error),
}

/// Thread-safe record tables, optionally backed by a data file.
#[derive(Debug, Default)]
pub struct RecordStore {
    tables: RwLock<Tables>,
    data_file: Option<PathBuf>,
}

impl RecordStore {
    /// Creates a store with empty tables that lives in memory only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store persisted at `path`. A missing file yields empty
    /// tables; the file is created on the first change.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the file cannot be read, or
    /// [`StorageError::Corrupt`] if it does not hold a table snapshot.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes).map_err(|source| {
                StorageError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::new(),
            Err(source) => return Err(StorageError::Read { path, source }),
        };
        tracing::info!(
            path = %path.display(),
            tasks = tables.len(Table::Tasks),
            notifications = tables.len(Table::Notifications),
            "record tables loaded"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            data_file: Some(path),
        })
    }

    /// The file this store persists to, if any.
    #[must_use]
    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }

    /// Runs one operation on behalf of `owner` and returns the reply to send.
    ///
    /// Engine rejections and write failures become [`StoreReply::Failed`];
    /// they never affect other connections.
    pub async fn execute(&self, owner: &OwnerId, op: StoreOp) -> StoreReply {
        let scope = Scope::Owner(owner.clone());
        let result = match op {
            StoreOp::Select {
                table,
                filters,
                order,
            } => {
                let tables = self.tables.read().await;
                return StoreReply::Records(tables.select(&scope, table, &filters, order));
            }
            StoreOp::Insert { draft } => self
                .mutate(|tables| tables.insert(&scope, draft).map(|record| (record, true)))
                .await
                .map(StoreReply::Inserted),
            StoreOp::Update {
                table,
                patch,
                filters,
            } => self
                .mutate(|tables| tables.update(&scope, table, &patch, &filters).map(|n| (n, n > 0)))
                .await
                .map(StoreReply::Affected),
            StoreOp::Delete { table, filters } => self
                .mutate(|tables| {
                    let n = tables.delete(&scope, table, &filters);
                    Ok((n, n > 0))
                })
                .await
                .map(StoreReply::Affected),
        };
        result.unwrap_or_else(|e| {
            if !matches!(e, StorageError::Engine(_)) {
                tracing::error!(owner = %owner, error = %e, "store write failed");
            }
            StoreReply::Failed(e.to_string())
        })
    }

    /// Clears the completed state of every completed recurring task, for all
    /// owners, and returns how many rows changed.
    ///
    /// # Errors
    ///
    /// Returns the [`StorageError`] raised by the update or by the write.
    pub async fn reset_recurring(&self) -> Result<u64, StorageError> {
        self.mutate(|tables| tables.reset_recurring().map(|n| (n, n > 0)))
            .await
    }

    /// Returns a copy of the current tables.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    /// Applies `op` under the write lock. `op` reports whether it changed
    /// any row; only changes are persisted.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Tables) -> Result<(T, bool), EngineError>,
    ) -> Result<T, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(path) = self.data_file.as_deref() else {
            let (out, _) = op(&mut tables)?;
            return Ok(out);
        };
        let mut next = tables.clone();
        let (out, changed) = op(&mut next)?;
        if changed {
            persist(path, &next).await?;
            *tables = next;
        }
        Ok(out)
    }
}

/// Writes `tables` next to `path` and renames the result into place.
async fn persist(path: &Path, tables: &Tables) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(tables).map_err(StorageError::Serialize)?;
    let write_failed = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await.map_err(write_failed)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_failed)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "record tables saved");
    Ok(())
}
