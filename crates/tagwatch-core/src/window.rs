//! Recent / history partitioning.
//!
//! A device is "recent" while its `last_seen` lies inside the window ending
//! at `now` (inclusive), and "history" afterwards. Partitioning never mutates
//! records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::registry::sort_by_last_seen;
use crate::store::{DeviceStore, StoreResult};
use crate::types::DeviceRecord;

/// Default recent window in seconds.
pub const DEFAULT_RECENT_WINDOW_SECS: u64 = 200;

/// The default recent window.
#[must_use]
pub fn default_window() -> Duration {
    Duration::seconds(DEFAULT_RECENT_WINDOW_SECS as i64)
}

/// Records split by the recent window, each list newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Records with `last_seen >= now - window`.
    pub recent: Vec<DeviceRecord>,
    /// All other records.
    pub history: Vec<DeviceRecord>,
}

/// Splits `records` into recent and history around `now`.
#[must_use]
pub fn partition(records: Vec<DeviceRecord>, now: DateTime<Utc>, window: Duration) -> Partition {
    let threshold = now - window;
    let (mut recent, mut history): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.last_seen >= threshold);
    sort_by_last_seen(&mut recent);
    sort_by_last_seen(&mut history);
    Partition { recent, history }
}

/// Windowed read view over a [`DeviceStore`].
#[derive(Clone)]
pub struct WindowedView {
    store: Arc<dyn DeviceStore>,
    window: Duration,
}

impl WindowedView {
    /// Creates a view with the given window.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// The configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Persisted devices seen inside the window, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn recent(&self, now: DateTime<Utc>) -> StoreResult<Vec<DeviceRecord>> {
        let mut records = self.store.query_devices_since(now - self.window)?;
        sort_by_last_seen(&mut records);
        Ok(records)
    }

    /// Persisted devices last seen before the window, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn history(&self, now: DateTime<Utc>) -> StoreResult<Vec<DeviceRecord>> {
        Ok(self.partition(now)?.history)
    }

    /// Both halves at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn partition(&self, now: DateTime<Utc>) -> StoreResult<Partition> {
        Ok(partition(self.store.query_devices()?, now, self.window))
    }
}
