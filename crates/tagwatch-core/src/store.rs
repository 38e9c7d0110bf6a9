//! Persistence for device records and sighting events.
//!
//! [`DeviceStore`] is the seam the registry and the read views talk to.
//! [`Storage`] implements it with an in-memory index that is optionally
//! written through to JSON files. Reads are served from the index and never
//! wait on file writes.
//!
//! ```text
//! <data_dir>/devices.json   all device records (rewritten on upsert)
//! <data_dir>/events.jsonl   one event per line (append-only)
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::types::{DeviceEvent, DeviceRecord};

const DEVICES_FILE: &str = "devices.json";
const EVENTS_FILE: &str = "events.jsonl";

/// Errors raised by [`DeviceStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A data file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A data file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A data file holds invalid JSON.
    #[error("failed to parse {}: {source}", path.display())]
    ParseError {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized.
    #[error("failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backend rejected the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable store for device records and sighting events.
///
/// Records are keyed by device id and written with upsert semantics. Events
/// are append-only.
pub trait DeviceStore: Send + Sync {
    /// Inserts or replaces records by id.
    fn upsert_devices(&self, records: &[DeviceRecord]) -> StoreResult<()>;

    /// Appends one event to the event log.
    fn append_event(&self, event: &DeviceEvent) -> StoreResult<()>;

    /// Returns all records.
    fn query_devices(&self) -> StoreResult<Vec<DeviceRecord>>;

    /// Returns records with `last_seen >= threshold`.
    fn query_devices_since(&self, threshold: DateTime<Utc>) -> StoreResult<Vec<DeviceRecord>> {
        let mut records = self.query_devices()?;
        records.retain(|r| r.last_seen >= threshold);
        Ok(records)
    }

    /// Returns the events for one device, newest first.
    fn query_events_for(&self, device_id: &str) -> StoreResult<Vec<DeviceEvent>>;

    /// Number of events recorded for one device.
    fn count_events_for(&self, device_id: &str) -> StoreResult<u64> {
        Ok(self.query_events_for(device_id)?.len() as u64)
    }

    /// Deletes every record and event.
    fn clear_all(&self) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct StorageState {
    devices: HashMap<String, DeviceRecord>,
    /// Events per device id, in append order.
    events: HashMap<String, Vec<DeviceEvent>>,
}

impl StorageState {
    fn event_total(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Default [`DeviceStore`]: in-memory index with optional JSON write-through.
#[derive(Debug)]
pub struct Storage {
    data_dir: Option<PathBuf>,
    state: Mutex<StorageState>,
    /// Serializes writers. The index is updated once the file write succeeds.
    writer: Mutex<()>,
    changes: watch::Sender<u64>,
}

impl Storage {
    /// Creates a store that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_state(None, StorageState::default())
    }

    /// Opens a store backed by JSON files in `data_dir`, loading existing data.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// device file cannot be read or parsed.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| StoreError::CreateDirError {
            path: data_dir.clone(),
            source,
        })?;

        let state = StorageState {
            devices: load_devices(&data_dir.join(DEVICES_FILE))?,
            events: load_events(&data_dir.join(EVENTS_FILE))?,
        };
        debug!(
            dir = %data_dir.display(),
            devices = state.devices.len(),
            events = state.event_total(),
            "opened device storage"
        );

        Ok(Self::with_state(Some(data_dir), state))
    }

    fn with_state(data_dir: Option<PathBuf>, state: StorageState) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            data_dir,
            state: Mutex::new(state),
            writer: Mutex::new(()),
            changes,
        }
    }

    /// Directory backing this store, `None` when in memory.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Subscribes to change notifications.
    ///
    /// The watched value is a revision counter bumped after every upsert and
    /// clear. Readers re-query when it changes.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    fn write_devices(&self, devices: &HashMap<String, DeviceRecord>) -> StoreResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = dir.join(DEVICES_FILE);
        let mut records: Vec<&DeviceRecord> = devices.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let content = serde_json::to_string_pretty(&records)?;
        std::fs::write(&path, content).map_err(|source| StoreError::WriteError { path, source })
    }

    fn write_event(&self, event: &DeviceEvent) -> StoreResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = dir.join(EVENTS_FILE);
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| StoreError::WriteError { path, source })
    }

    fn remove_files(&self) -> StoreResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        for name in [DEVICES_FILE, EVENTS_FILE] {
            let path = dir.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::WriteError { path, source }),
            }
        }
        Ok(())
    }
}

impl DeviceStore for Storage {
    fn upsert_devices(&self, records: &[DeviceRecord]) -> StoreResult<()> {
        {
            let _writer = self.lock_writer();
            let mut devices = self.lock().devices.clone();
            for record in records {
                devices.insert(record.id.clone(), record.clone());
            }
            self.write_devices(&devices)?;
            self.lock().devices = devices;
        }
        self.notify();
        Ok(())
    }

    fn append_event(&self, event: &DeviceEvent) -> StoreResult<()> {
        let _writer = self.lock_writer();
        self.write_event(event)?;
        self.lock()
            .events
            .entry(event.device_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn query_devices(&self) -> StoreResult<Vec<DeviceRecord>> {
        Ok(self.lock().devices.values().cloned().collect())
    }

    fn query_events_for(&self, device_id: &str) -> StoreResult<Vec<DeviceEvent>> {
        let mut events = self
            .lock()
            .events
            .get(device_id)
            .cloned()
            .unwrap_or_default();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    fn count_events_for(&self, device_id: &str) -> StoreResult<u64> {
        Ok(self.lock().events.get(device_id).map_or(0, Vec::len) as u64)
    }

    fn clear_all(&self) -> StoreResult<()> {
        {
            let _writer = self.lock_writer();
            self.remove_files()?;
            *self.lock() = StorageState::default();
        }
        self.notify();
        Ok(())
    }
}

fn load_devices(path: &Path) -> StoreResult<HashMap<String, DeviceRecord>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<DeviceRecord> =
        serde_json::from_str(&content).map_err(|source| StoreError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
}

fn load_events(path: &Path) -> StoreResult<HashMap<String, Vec<DeviceEvent>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut events: HashMap<String, Vec<DeviceEvent>> = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DeviceEvent>(line) {
            Ok(event) => events.entry(event.device_id.clone()).or_default().push(event),
            // A torn final line after a crash should not make the log unreadable.
            Err(e) => warn!(line = index + 1, error = %e, "skipping malformed event line"),
        }
    }
    Ok(events)
}
