//! Device registry for one scan session.
//!
//! The registry folds batches of raw sightings into one [`DeviceRecord`] per
//! device id. Every device present in a batch is rewritten in full; devices
//! absent from a batch keep their previous state.
//!
//! [`DeviceRegistry::merge`] only updates memory and hands back the writes
//! the batch produced as [`PendingWrites`], so callers can persist them
//! without holding whatever guards the registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::store::{DeviceStore, StoreError};
use crate::types::{DeviceEvent, DeviceRecord, RawDevice};

/// Registry behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Seed `event_count` for an id the registry has not seen this session
    /// from the events already persisted for it.
    pub recover_event_counts: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            recover_event_counts: true,
        }
    }
}

/// Outcome of folding one batch into the registry.
#[derive(Debug, Default)]
pub struct Observation {
    /// Every record in the registry, sorted by `last_seen` descending.
    pub snapshot: Vec<DeviceRecord>,

    /// Number of records written by this batch.
    pub updated: usize,

    /// Persistence failures hit while processing the batch. The in-memory
    /// state is kept regardless.
    pub persistence_errors: Vec<StoreError>,
}

/// Store writes produced by one merged batch.
#[derive(Debug, Default)]
pub struct PendingWrites {
    events: Vec<DeviceEvent>,
    records: Vec<DeviceRecord>,
}

impl PendingWrites {
    /// Whether the batch produced nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.records.is_empty()
    }

    /// Appends the events, then upserts the records once. Every failure is
    /// logged and returned; later writes are still attempted.
    pub fn apply(self, store: &dyn DeviceStore) -> Vec<StoreError> {
        let mut errors = Vec::new();
        for event in &self.events {
            if let Err(e) = store.append_event(event) {
                warn!(device_id = %event.device_id, error = %e, "failed to append device event");
                errors.push(e);
            }
        }
        if !self.records.is_empty() {
            if let Err(e) = store.upsert_devices(&self.records) {
                warn!(count = self.records.len(), error = %e, "failed to persist device records");
                errors.push(e);
            }
        }
        errors
    }
}

/// In-memory map from device id to aggregated record.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
    classifier: Classifier,
    options: RegistryOptions,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(classifier: Classifier, options: RegistryOptions) -> Self {
        Self {
            devices: HashMap::new(),
            classifier,
            options,
        }
    }

    /// Folds a batch of sightings observed at `now` into the registry and
    /// writes it through to `store`.
    ///
    /// Appends one event per sighting and upserts every touched record once
    /// the batch is processed.
    pub fn observe(
        &mut self,
        batch: Vec<RawDevice>,
        now: DateTime<Utc>,
        store: &dyn DeviceStore,
    ) -> Observation {
        let (mut observation, pending) = self.merge(batch, now, store);
        observation
            .persistence_errors
            .extend(pending.apply(store));
        observation
    }

    /// Folds a batch into memory without writing it.
    ///
    /// `store` is only read, to recover event counts for ids new to this
    /// session. The returned [`PendingWrites`] hold one event per sighting
    /// and every touched record.
    pub fn merge(
        &mut self,
        batch: Vec<RawDevice>,
        now: DateTime<Utc>,
        store: &dyn DeviceStore,
    ) -> (Observation, PendingWrites) {
        let mut observation = Observation::default();
        let mut pending = PendingWrites::default();
        let mut touched: Vec<String> = Vec::with_capacity(batch.len());

        for raw in batch {
            let (first_seen, last_seen, previous_count) = match self.devices.get(&raw.id) {
                // `now` never moves a record backwards.
                Some(existing) => (
                    existing.first_seen,
                    existing.last_seen.max(now),
                    existing.event_count,
                ),
                None => (
                    now,
                    now,
                    self.recovered_event_count(&raw.id, store, &mut observation),
                ),
            };

            let classification = self.classifier.classify(&raw.payload);
            let record = DeviceRecord {
                id: raw.id.clone(),
                name: raw.name,
                first_seen,
                last_seen,
                signal_strength: raw.rssi,
                is_trusted: raw.is_trusted,
                tracker_kind: classification.kind,
                vendor: classification.vendor,
                connection_status: classification.connection_status,
                event_count: previous_count + 1,
            };
            debug_assert!(record.first_seen <= record.last_seen);

            pending
                .events
                .push(DeviceEvent::new(raw.id.clone(), now, raw.rssi));

            if !touched.contains(&raw.id) {
                touched.push(raw.id.clone());
            }
            self.devices.insert(raw.id, record);
        }

        pending.records = touched
            .iter()
            .filter_map(|id| self.devices.get(id).cloned())
            .collect();

        observation.updated = pending.records.len();
        observation.snapshot = self.snapshot();
        debug!(
            updated = observation.updated,
            total = observation.snapshot.len(),
            "merged batch"
        );
        (observation, pending)
    }

    fn recovered_event_count(
        &self,
        device_id: &str,
        store: &dyn DeviceStore,
        observation: &mut Observation,
    ) -> u64 {
        if !self.options.recover_event_counts {
            return 0;
        }
        match store.count_events_for(device_id) {
            Ok(count) => count,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "failed to recover event count");
                observation.persistence_errors.push(e);
                0
            }
        }
    }

    /// All records, sorted by `last_seen` descending.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        sort_by_last_seen(&mut records);
        records
    }

    /// Looks up one record.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// Number of tracked devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Forgets every device. Persisted data is untouched.
    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

/// Sorts records newest first, breaking ties by id.
pub fn sort_by_last_seen(records: &mut [DeviceRecord]) {
    records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
}
