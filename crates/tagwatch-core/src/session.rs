//! Scan session control.
//!
//! The radio scan itself belongs to an external [`ScanSession`]. A session
//! has a single consumer slot; [`ScanController::start`] saves whatever
//! consumer currently occupies it, installs the controller, and puts the
//! saved consumer back on [`ScanController::stop`].
//!
//! ```text
//!          start()                            stop()
//!   Idle ─────────▶ Starting ──▶ Scanning ─────────▶ Stopping ──▶ Idle
//!    │  clear registry    │                │  cancel stop timer
//!    │  save consumer     │                │  stop radio scan
//!    │  attach controller │                │  restore consumer
//!    │  start radio scan  │
//!                         └─ stop() here is deferred until Scanning
//! ```
//!
//! The consumer hand-off runs without the controller's mutex held, so the
//! session may call back into the controller. A `stop()` that lands while
//! starting is recorded and carried out once the hand-off finishes.
//!
//! Batches are folded into the [`DeviceRegistry`] under the controller's
//! mutex, so they are never merged concurrently. Their store writes are
//! queued and flushed in order after the mutex is released; readers never
//! wait on disk. Subscribers receive [`SessionEvent`]s over a broadcast
//! channel; a send never waits on them.

use std::collections::VecDeque;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{DeviceRegistry, PendingWrites};
use crate::store::{DeviceStore, StoreError};
use crate::trust::TrustList;
use crate::types::{DeviceRecord, RadioState, RawDevice};

/// Buffered events per subscriber before the slowest one starts lagging.
pub const SESSION_EVENT_CAPACITY: usize = 64;

/// Receives scan output from a [`ScanSession`].
pub trait ScanConsumer: Send + Sync {
    /// A batch of sightings.
    fn on_batch(&self, batch: Vec<RawDevice>);

    /// The radio's power or authorization state changed.
    fn on_radio_state(&self, state: RadioState);
}

/// External radio scan session.
///
/// Failures are reported through [`ScanConsumer::on_radio_state`], never
/// returned.
pub trait ScanSession: Send + Sync {
    /// Begins delivering batches to the current consumer.
    fn start_scanning(&self);

    /// Stops delivering batches.
    fn stop_scanning(&self);

    /// Installs `consumer` and returns the one it replaced.
    fn replace_consumer(
        &self,
        consumer: Option<Arc<dyn ScanConsumer>>,
    ) -> Option<Arc<dyn ScanConsumer>>;
}

/// Errors from [`ScanController`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A timer was requested outside a tokio runtime.
    #[error("no tokio runtime available to run the scan timer")]
    NoRuntime,

    /// The operation requires an active scan.
    #[error("no scan is in progress")]
    NotScanning,
}

/// Scan lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// No scan is running.
    #[default]
    Idle,
    /// The controller is attaching itself to the session.
    Starting,
    /// A scan is running and batches are processed.
    Scanning,
    /// The controller is handing the session back.
    Stopping,
}

/// Notifications published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A scan started.
    ScanStarted,
    /// The scan stopped.
    ScanStopped,
    /// Full device snapshot after a batch, newest first.
    DevicesUpdated(Vec<DeviceRecord>),
    /// The radio reported a new state.
    RadioStateChanged(RadioState),
    /// A persistence write failed; in-memory state was kept.
    PersistenceFailed {
        /// Error description.
        message: String,
    },
}

struct ControllerState {
    scan_state: ScanState,
    radio_state: RadioState,
    registry: DeviceRegistry,
    saved_consumer: Option<Arc<dyn ScanConsumer>>,
    stop_timer: Option<JoinHandle<()>>,
    stop_requested: bool,
    pending_writes: VecDeque<PendingWrites>,
}

/// Owns the scan lifecycle and the device registry.
pub struct ScanController {
    this: Weak<ScanController>,
    session: Arc<dyn ScanSession>,
    store: Arc<dyn DeviceStore>,
    trust: Arc<dyn TrustList>,
    state: Mutex<ControllerState>,
    /// Held while flushing queued writes to the store.
    flush: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl ScanController {
    /// Creates an idle controller.
    #[must_use]
    pub fn new(
        session: Arc<dyn ScanSession>,
        store: Arc<dyn DeviceStore>,
        trust: Arc<dyn TrustList>,
        registry: DeviceRegistry,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            session,
            store,
            trust,
            state: Mutex::new(ControllerState {
                scan_state: ScanState::Idle,
                radio_state: RadioState::Unknown,
                registry,
                saved_consumer: None,
                stop_timer: None,
                stop_requested: false,
                pending_writes: VecDeque::new(),
            }),
            flush: Mutex::new(()),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.lock().scan_state
    }

    /// Whether a scan is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Last radio state reported by the session.
    #[must_use]
    pub fn radio_state(&self) -> RadioState {
        self.lock().radio_state
    }

    /// Devices seen in the current session, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.lock().registry.snapshot()
    }

    /// Starts a scan. Does nothing unless idle.
    pub fn start(&self) {
        {
            let mut state = self.lock();
            if state.scan_state != ScanState::Idle {
                debug!(state = ?state.scan_state, "scan not idle, ignoring start");
                return;
            }
            state.scan_state = ScanState::Starting;
            state.stop_requested = false;
            state.registry.clear();
        }

        self.session.stop_scanning();
        let me: Option<Arc<dyn ScanConsumer>> = self
            .this
            .upgrade()
            .map(|controller| controller as Arc<dyn ScanConsumer>);
        let previous = self.session.replace_consumer(me);
        self.session.start_scanning();

        let stop_requested = {
            let mut state = self.lock();
            state.saved_consumer = previous;
            state.scan_state = ScanState::Scanning;
            std::mem::take(&mut state.stop_requested)
        };

        info!("scan started");
        self.publish(SessionEvent::ScanStarted);

        if stop_requested {
            debug!("stop requested while starting");
            self.stop();
        }
    }

    /// Stops the scan and restores the previous consumer. Idempotent.
    ///
    /// Called while the scan is starting, the stop runs as soon as the start
    /// completes.
    pub fn stop(&self) {
        let saved = {
            let mut state = self.lock();
            match state.scan_state {
                ScanState::Idle | ScanState::Stopping => return,
                ScanState::Starting => {
                    state.stop_requested = true;
                    return;
                }
                ScanState::Scanning => {}
            }
            state.scan_state = ScanState::Stopping;
            if let Some(timer) = state.stop_timer.take() {
                timer.abort();
            }
            state.saved_consumer.take()
        };

        self.session.stop_scanning();
        self.session.replace_consumer(saved);
        self.lock().scan_state = ScanState::Idle;

        info!("scan stopped");
        self.publish(SessionEvent::ScanStopped);
    }

    /// Stops the scan after `after` elapses, replacing any earlier timer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotScanning`] when idle and
    /// [`SessionError::NoRuntime`] outside a tokio runtime.
    pub fn schedule_stop(&self, after: Duration) -> Result<(), SessionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut state = self.lock();
        if state.scan_state != ScanState::Scanning {
            return Err(SessionError::NotScanning);
        }

        let this = self.this.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(controller) = this.upgrade() {
                debug!(after_ms = after.as_millis(), "scan timer elapsed");
                controller.stop();
            }
        });
        if let Some(previous) = state.stop_timer.replace(timer) {
            previous.abort();
        }
        Ok(())
    }

    /// Folds a batch observed at `now` into the registry, then writes it to
    /// the store.
    ///
    /// Batches arriving outside `Starting` or `Scanning` are dropped.
    pub fn observe_batch_at(&self, mut batch: Vec<RawDevice>, now: DateTime<Utc>) {
        let read_errors = {
            let mut state = self.lock();
            if !matches!(state.scan_state, ScanState::Starting | ScanState::Scanning) {
                debug!(size = batch.len(), "dropping batch received while not scanning");
                return;
            }

            for raw in &mut batch {
                raw.is_trusted = raw.is_trusted || self.trust.is_trusted(&raw.id);
            }

            let (observation, pending) = state.registry.merge(batch, now, self.store.as_ref());
            state.pending_writes.push_back(pending);
            self.publish(SessionEvent::DevicesUpdated(observation.snapshot));
            observation.persistence_errors
        };

        let mut errors = read_errors;
        errors.extend(self.flush_writes());
        for error in &errors {
            self.publish(SessionEvent::PersistenceFailed {
                message: error.to_string(),
            });
        }
    }

    /// Writes queued batches to the store in arrival order.
    fn flush_writes(&self) -> Vec<StoreError> {
        let _flush = self.flush.lock().unwrap_or_else(PoisonError::into_inner);
        let mut errors = Vec::new();
        loop {
            let next = self.lock().pending_writes.pop_front();
            let Some(pending) = next else {
                break;
            };
            errors.extend(pending.apply(self.store.as_ref()));
        }
        errors
    }
}

impl ScanConsumer for ScanController {
    fn on_batch(&self, batch: Vec<RawDevice>) {
        self.observe_batch_at(batch, Utc::now());
    }

    fn on_radio_state(&self, radio_state: RadioState) {
        let mut state = self.lock();
        if state.radio_state != radio_state {
            info!(?radio_state, "radio state changed");
        }
        state.radio_state = radio_state;
        self.publish(SessionEvent::RadioStateChanged(radio_state));
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.stop_timer.take() {
            timer.abort();
        }
        if state.scan_state != ScanState::Idle {
            warn!(state = ?state.scan_state, "scan controller dropped while scanning");
        }
    }
}

/// In-process [`ScanSession`] fed by the caller.
///
/// Used by tests and by the server when no radio backend is compiled in.
#[derive(Default)]
pub struct LocalScanSession {
    consumer: Mutex<Option<Arc<dyn ScanConsumer>>>,
    scanning: Mutex<bool>,
}

impl LocalScanSession {
    /// Creates a session with no consumer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session is currently scanning.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        *self.scanning.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_consumer(&self) -> Option<Arc<dyn ScanConsumer>> {
        self.consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivers a batch to the consumer if scanning. Returns whether it was delivered.
    pub fn deliver_batch(&self, batch: Vec<RawDevice>) -> bool {
        if !self.is_scanning() {
            return false;
        }
        match self.current_consumer() {
            Some(consumer) => {
                consumer.on_batch(batch);
                true
            }
            None => false,
        }
    }

    /// Reports a radio state to the consumer.
    pub fn report_radio_state(&self, state: RadioState) {
        if let Some(consumer) = self.current_consumer() {
            consumer.on_radio_state(state);
        }
    }
}

impl ScanSession for LocalScanSession {
    fn start_scanning(&self) {
        *self.scanning.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn stop_scanning(&self) {
        *self.scanning.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn replace_consumer(
        &self,
        consumer: Option<Arc<dyn ScanConsumer>>,
    ) -> Option<Arc<dyn ScanConsumer>> {
        std::mem::replace(
            &mut *self.consumer.lock().unwrap_or_else(PoisonError::into_inner),
            consumer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, StoreResult, Storage};
    use crate::trust::AllowList;
    use crate::types::{AdvertisementPayload, DeviceEvent, TrackerKind};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, OnceLock};

    #[derive(Default)]
    struct RecordingConsumer {
        batches: Mutex<usize>,
        radio_states: Mutex<Vec<RadioState>>,
    }

    impl ScanConsumer for RecordingConsumer {
        fn on_batch(&self, _batch: Vec<RawDevice>) {
            *self.batches.lock().unwrap() += 1;
        }

        fn on_radio_state(&self, state: RadioState) {
            self.radio_states.lock().unwrap().push(state);
        }
    }

    struct FailingStore;

    impl DeviceStore for FailingStore {
        fn upsert_devices(&self, _records: &[DeviceRecord]) -> StoreResult<()> {
            Err(StoreError::Unavailable("read-only".into()))
        }
        fn append_event(&self, _event: &DeviceEvent) -> StoreResult<()> {
            Ok(())
        }
        fn query_devices(&self) -> StoreResult<Vec<DeviceRecord>> {
            Ok(Vec::new())
        }
        fn query_events_for(&self, _device_id: &str) -> StoreResult<Vec<DeviceEvent>> {
            Ok(Vec::new())
        }
        fn clear_all(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    /// Stops its controller from inside the first `stop_scanning` call,
    /// which `start` makes mid hand-off.
    #[derive(Default)]
    struct InterruptingSession {
        inner: LocalScanSession,
        controller: OnceLock<Weak<ScanController>>,
        interrupted: AtomicBool,
    }

    impl ScanSession for InterruptingSession {
        fn start_scanning(&self) {
            self.inner.start_scanning();
        }

        fn stop_scanning(&self) {
            self.inner.stop_scanning();
            if !self.interrupted.swap(true, Ordering::SeqCst) {
                if let Some(controller) = self.controller.get().and_then(Weak::upgrade) {
                    controller.stop();
                }
            }
        }

        fn replace_consumer(
            &self,
            consumer: Option<Arc<dyn ScanConsumer>>,
        ) -> Option<Arc<dyn ScanConsumer>> {
            self.inner.replace_consumer(consumer)
        }
    }

    /// Blocks every upsert until the test releases it.
    struct GatedStore {
        inner: Storage,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl DeviceStore for GatedStore {
        fn upsert_devices(&self, records: &[DeviceRecord]) -> StoreResult<()> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            self.inner.upsert_devices(records)
        }
        fn append_event(&self, event: &DeviceEvent) -> StoreResult<()> {
            self.inner.append_event(event)
        }
        fn query_devices(&self) -> StoreResult<Vec<DeviceRecord>> {
            self.inner.query_devices()
        }
        fn query_events_for(&self, device_id: &str) -> StoreResult<Vec<DeviceEvent>> {
            self.inner.query_events_for(device_id)
        }
        fn clear_all(&self) -> StoreResult<()> {
            self.inner.clear_all()
        }
    }

    fn raw(id: &str, name: &str) -> RawDevice {
        RawDevice {
            id: id.to_string(),
            is_trusted: false,
            name: name.to_string(),
            rssi: -60,
            payload: AdvertisementPayload {
                local_name: Some(name.to_string()),
                rssi: -60,
                ..AdvertisementPayload::default()
            },
        }
    }

    fn controller_with(
        store: Arc<dyn DeviceStore>,
        trust: AllowList,
    ) -> (Arc<LocalScanSession>, Arc<ScanController>) {
        let session = Arc::new(LocalScanSession::new());
        let controller = ScanController::new(
            session.clone(),
            store,
            Arc::new(trust),
            DeviceRegistry::default(),
        );
        (session, controller)
    }

    fn controller() -> (Arc<LocalScanSession>, Arc<ScanController>) {
        controller_with(Arc::new(Storage::in_memory()), AllowList::new())
    }

    #[test]
    fn test_start_and_stop_transitions() {
        let (session, controller) = controller();
        assert_eq!(controller.state(), ScanState::Idle);

        controller.start();
        assert!(controller.is_scanning());
        assert!(session.is_scanning());

        controller.stop();
        assert_eq!(controller.state(), ScanState::Idle);
        assert!(!session.is_scanning());

        // second stop is a no-op
        controller.stop();
        assert_eq!(controller.state(), ScanState::Idle);
    }

    #[test]
    fn test_batches_reach_registry_while_scanning() {
        let (session, controller) = controller();
        controller.start();
        assert!(session.deliver_batch(vec![raw("A", "AirTag")]));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].tracker_kind, TrackerKind::Airtag);
    }

    #[test]
    fn test_batches_dropped_when_idle() {
        let (_session, controller) = controller();
        controller.on_batch(vec![raw("A", "AirTag")]);
        assert!(controller.snapshot().is_empty());
    }

    #[test]
    fn test_start_clears_registry() {
        let (session, controller) = controller();
        controller.start();
        session.deliver_batch(vec![raw("A", "")]);
        controller.stop();
        assert_eq!(controller.snapshot().len(), 1);

        controller.start();
        assert!(controller.snapshot().is_empty());
    }

    #[test]
    fn test_previous_consumer_is_restored() {
        let (session, controller) = controller();
        let previous = Arc::new(RecordingConsumer::default());
        session.replace_consumer(Some(previous.clone() as Arc<dyn ScanConsumer>));

        controller.start();
        session.deliver_batch(vec![raw("A", "")]);
        session.report_radio_state(RadioState::PoweredOn);
        assert_eq!(*previous.batches.lock().unwrap(), 0);
        assert!(previous.radio_states.lock().unwrap().is_empty());

        controller.stop();
        session.report_radio_state(RadioState::PoweredOff);
        assert_eq!(
            *previous.radio_states.lock().unwrap(),
            vec![RadioState::PoweredOff]
        );
    }

    #[test]
    fn test_trust_list_is_consulted() {
        let (session, controller) =
            controller_with(Arc::new(Storage::in_memory()), ["A"].into_iter().collect());
        controller.start();
        session.deliver_batch(vec![raw("A", "AirTag"), raw("B", "AirTag")]);

        let snapshot = controller.snapshot();
        let a = snapshot.iter().find(|r| r.id == "A").unwrap();
        let b = snapshot.iter().find(|r| r.id == "B").unwrap();
        assert!(a.is_trusted);
        assert!(!a.is_potential_risk());
        assert!(b.is_potential_risk());
    }

    #[test]
    fn test_subscribers_receive_sorted_snapshot() {
        let (_session, controller) = controller();
        let mut rx = controller.subscribe();
        controller.start();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ScanStarted);

        controller.observe_batch_at(vec![raw("A", "")], Utc.timestamp_opt(10, 0).unwrap());
        controller.observe_batch_at(vec![raw("B", "")], Utc.timestamp_opt(20, 0).unwrap());

        let _first = rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            SessionEvent::DevicesUpdated(records) => {
                let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
                assert_eq!(ids, vec!["B", "A"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_radio_state_is_forwarded() {
        let (session, controller) = controller();
        let mut rx = controller.subscribe();
        controller.start();
        let _ = rx.try_recv();

        session.report_radio_state(RadioState::Unauthorized);
        assert_eq!(controller.radio_state(), RadioState::Unauthorized);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::RadioStateChanged(RadioState::Unauthorized)
        );
    }

    #[test]
    fn test_persistence_failure_is_published() {
        let (session, controller) = controller_with(Arc::new(FailingStore), AllowList::new());
        let mut rx = controller.subscribe();
        controller.start();
        let _ = rx.try_recv();

        session.deliver_batch(vec![raw("A", "")]);
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::DevicesUpdated(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::PersistenceFailed { .. }
        ));
        assert_eq!(controller.snapshot().len(), 1);
    }

    #[test]
    fn test_stop_during_start_handoff_restores_consumer() {
        let session = Arc::new(InterruptingSession::default());
        let previous = Arc::new(RecordingConsumer::default());
        session.replace_consumer(Some(previous.clone() as Arc<dyn ScanConsumer>));

        let controller = ScanController::new(
            session.clone(),
            Arc::new(Storage::in_memory()),
            Arc::new(AllowList::new()),
            DeviceRegistry::default(),
        );
        assert!(session.controller.set(Arc::downgrade(&controller)).is_ok());
        let mut rx = controller.subscribe();

        controller.start();

        assert_eq!(controller.state(), ScanState::Idle);
        assert!(!session.inner.is_scanning());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ScanStarted);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ScanStopped);

        session.inner.report_radio_state(RadioState::PoweredOff);
        assert_eq!(
            *previous.radio_states.lock().unwrap(),
            vec![RadioState::PoweredOff]
        );
        assert_eq!(controller.radio_state(), RadioState::Unknown);

        // the controller can start again afterwards
        controller.start();
        assert!(controller.is_scanning());
    }

    #[test]
    fn test_snapshot_does_not_wait_on_store_writes() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: Storage::in_memory(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let (session, controller) = controller_with(store.clone(), AllowList::new());
        controller.start();

        let delivery = {
            let session = session.clone();
            std::thread::spawn(move || session.deliver_batch(vec![raw("A", "AirTag")]))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (snapshot_tx, snapshot_rx) = mpsc::channel();
        let reader = controller.clone();
        std::thread::spawn(move || {
            let _ = snapshot_tx.send((reader.snapshot(), reader.state()));
        });
        let read = snapshot_rx.recv_timeout(Duration::from_secs(1));

        release_tx.send(()).unwrap();
        assert!(delivery.join().unwrap());

        let (snapshot, state) = read.expect("snapshot waited on the store write");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(state, ScanState::Scanning);
        assert_eq!(store.inner.query_devices().unwrap().len(), 1);
        assert_eq!(store.inner.count_events_for("A").unwrap(), 1);
    }

    #[test]
    fn test_schedule_stop_requires_runtime() {
        let (_session, controller) = controller();
        controller.start();
        assert_eq!(
            controller.schedule_stop(Duration::from_millis(10)),
            Err(SessionError::NoRuntime)
        );
    }

    #[tokio::test]
    async fn test_schedule_stop_requires_scan() {
        let (_session, controller) = controller();
        assert_eq!(
            controller.schedule_stop(Duration::from_millis(10)),
            Err(SessionError::NotScanning)
        );
    }

    #[tokio::test]
    async fn test_scheduled_stop_fires() {
        let (session, controller) = controller();
        controller.start();
        controller.schedule_stop(Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(controller.state(), ScanState::Idle);
        assert!(!session.is_scanning());
    }

    #[tokio::test]
    async fn test_stop_cancels_timer() {
        let (_session, controller) = controller();
        controller.start();
        controller.schedule_stop(Duration::from_millis(50)).unwrap();
        controller.stop();
        controller.start();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(controller.is_scanning());
    }
}
