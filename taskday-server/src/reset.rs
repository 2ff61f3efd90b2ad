//! Daily reset of recurring tasks.
//!
//! Once a day, at a fixed UTC boundary, every completed recurring task is
//! made incomplete again. The same operation backs the `POST /reset`
//! endpoint so an external scheduler can drive it instead.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use crate::store::{RecordStore, StorageError};

/// Returns the first occurrence of `boundary` strictly after `now`.
#[must_use]
pub fn next_reset_after(now: DateTime<Utc>, boundary: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(boundary).and_utc();
    if today > now {
        return today;
    }
    // The day after today always exists for realistic clocks.
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

/// Runs the reset once and logs the outcome.
///
/// # Errors
///
/// Returns the [`StorageError`] raised by the store.
pub async fn run_reset(store: &RecordStore) -> Result<u64, StorageError> {
    match store.reset_recurring().await {
        Ok(reset) => {
            tracing::info!(reset, "recurring tasks reset");
            Ok(reset)
        }
        Err(e) => {
            tracing::error!(error = %e, "recurring reset failed");
            Err(e)
        }
    }
}

/// Spawns the daily scheduler. It sleeps until each boundary, fires the
/// reset, and repeats until the task is aborted.
pub fn spawn_daily(store: Arc<RecordStore>, boundary: NaiveTime) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_reset_after(now, boundary);
            tracing::debug!(%next, "next recurring reset scheduled");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            // Failures are logged; the next day's run retries.
            let _ = run_reset(&store).await;
        }
    })
}
