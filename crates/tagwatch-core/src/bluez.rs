//! BlueZ-backed scan session (Linux, feature `bluetooth`).
//!
//! Discovery runs in a background task. Devices that appear or change are
//! collected and flushed to the consumer as one batch per interval, which
//! keeps registry updates coarse enough for persistence to keep up.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, ErrorKind, Session};
use futures::{pin_mut, StreamExt};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{ScanConsumer, ScanSession};
use crate::types::{AdvertisementPayload, RadioState, RawDevice};

/// Errors raised while opening the BlueZ session.
#[derive(Debug, Error)]
pub enum BluezError {
    /// The call must run inside a tokio runtime.
    #[error("BlueZ session requires a tokio runtime")]
    NoRuntime,

    /// BlueZ returned an error.
    #[error("BlueZ error: {0}")]
    Bluer(#[from] bluer::Error),
}

type ConsumerSlot = Arc<Mutex<Option<Arc<dyn ScanConsumer>>>>;

/// [`ScanSession`] backed by the system's default BlueZ adapter.
pub struct BluezScanSession {
    _session: Session,
    adapter: Adapter,
    batch_interval: Duration,
    runtime: Handle,
    consumer: ConsumerSlot,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BluezScanSession {
    /// Connects to BlueZ and selects the default adapter.
    ///
    /// # Errors
    ///
    /// Returns an error outside a tokio runtime, or if BlueZ is unreachable
    /// or has no adapter.
    pub async fn new(batch_interval: Duration) -> Result<Self, BluezError> {
        let runtime = Handle::try_current().map_err(|_| BluezError::NoRuntime)?;
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!(adapter = adapter.name(), "using Bluetooth adapter");

        Ok(Self {
            _session: session,
            adapter,
            batch_interval,
            runtime,
            consumer: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        })
    }
}

impl ScanSession for BluezScanSession {
    fn start_scanning(&self) {
        let adapter = self.adapter.clone();
        let consumer = Arc::clone(&self.consumer);
        let interval = self.batch_interval;

        let task = self.runtime.spawn(async move {
            if let Err(e) = discover(&adapter, &consumer, interval).await {
                warn!(error = %e, "Bluetooth discovery ended with an error");
                report_state(&consumer, radio_state_for(&e));
            }
        });

        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn stop_scanning(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            // Dropping the discovery stream ends discovery on the adapter.
            task.abort();
            debug!("Bluetooth discovery stopped");
        }
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

impl Drop for BluezScanSession {
    fn drop(&mut self) {
        self.stop_scanning();
    }
}

fn current(consumer: &ConsumerSlot) -> Option<Arc<dyn ScanConsumer>> {
    consumer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn report_state(consumer: &ConsumerSlot, state: RadioState) {
    if let Some(consumer) = current(consumer) {
        consumer.on_radio_state(state);
    }
}

fn radio_state_for(error: &bluer::Error) -> RadioState {
    match error.kind {
        ErrorKind::NotAuthorized => RadioState::Unauthorized,
        ErrorKind::NotSupported => RadioState::Unsupported,
        ErrorKind::NotReady => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

async fn discover(
    adapter: &Adapter,
    consumer: &ConsumerSlot,
    interval: Duration,
) -> bluer::Result<()> {
    if !adapter.is_powered().await? {
        report_state(consumer, RadioState::PoweredOff);
        return Ok(());
    }
    report_state(consumer, RadioState::PoweredOn);

    let events = adapter.discover_devices_with_changes().await?;
    pin_mut!(events);

    let mut pending: HashSet<Address> = HashSet::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(AdapterEvent::DeviceAdded(address)) => {
                    pending.insert(address);
                }
                Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered))) => {
                    let state = if powered { RadioState::PoweredOn } else { RadioState::PoweredOff };
                    report_state(consumer, state);
                }
                Some(_) => {}
                None => break,
            },
            _ = ticker.tick() => {
                if pending.is_empty() {
                    continue;
                }
                let mut batch = Vec::with_capacity(pending.len());
                for address in pending.drain() {
                    match read_device(adapter, address).await {
                        Ok(Some(raw)) => batch.push(raw),
                        Ok(None) => {}
                        Err(e) => debug!(%address, error = %e, "skipping unreadable device"),
                    }
                }
                if !batch.is_empty() {
                    if let Some(consumer) = current(consumer) {
                        // Batches persist records, so they run off the async workers
                        // and one at a time.
                        let delivery = tokio::task::spawn_blocking(move || consumer.on_batch(batch));
                        if let Err(e) = delivery.await {
                            warn!(error = %e, "batch delivery failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Reads one device's advertisement. Devices without a current RSSI are
/// cached entries that are not in range.
async fn read_device(adapter: &Adapter, address: Address) -> bluer::Result<Option<RawDevice>> {
    let device = adapter.device(address)?;
    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };

    let name = device.name().await?;
    // BlueZ strips the company id; restore it little-endian as radios send it.
    let manufacturer_data = device
        .manufacturer_data()
        .await?
        .and_then(|entries| entries.into_iter().min_by_key(|(company, _)| *company))
        .map(|(company, data)| {
            let mut bytes = company.to_le_bytes().to_vec();
            bytes.extend(data);
            bytes
        });
    let service_uuids = device
        .uuids()
        .await?
        .unwrap_or_default()
        .into_iter()
        .map(|uuid| uuid.to_string())
        .collect();
    let service_data = device
        .service_data()
        .await?
        .unwrap_or_default()
        .into_iter()
        .map(|(uuid, data)| (uuid.to_string(), data))
        .collect();

    Ok(Some(RawDevice {
        id: address.to_string(),
        is_trusted: false,
        name: name.clone().unwrap_or_default(),
        rssi,
        payload: AdvertisementPayload {
            local_name: name,
            manufacturer_data,
            service_uuids,
            service_data,
            rssi,
        },
    }))
}
