//! Background task that reacts to session events.
//!
//! Stops the running scan when the radio powers off, and logs persistence
//! failures and risk counts as batches come in.

use std::sync::Arc;

use tagwatch_core::{RadioState, ScanController, SessionEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns the watchdog for `controller`. The task ends when the controller
/// is dropped.
pub fn spawn(controller: &Arc<ScanController>) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    let controller = Arc::downgrade(controller);

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "watchdog lagged behind session events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                SessionEvent::RadioStateChanged(RadioState::PoweredOff) => {
                    if let Some(controller) = controller.upgrade() {
                        if controller.is_scanning() {
                            info!("radio powered off, stopping scan");
                            controller.stop();
                        }
                    }
                }
                SessionEvent::PersistenceFailed { message } => {
                    warn!(error = %message, "sighting was not persisted");
                }
                SessionEvent::DevicesUpdated(devices) => {
                    let risks = devices.iter().filter(|d| d.is_potential_risk()).count();
                    debug!(devices = devices.len(), risks, "devices updated");
                }
                SessionEvent::ScanStarted
                | SessionEvent::ScanStopped
                | SessionEvent::RadioStateChanged(_) => {}
            }
        }
    })
}
