//! Application state shared across handlers.

use std::sync::Arc;

use tagwatch_core::{
    Classifier, DeviceRegistry, DeviceStore, ScanController, ScanSession, Storage, TagwatchConfig,
    WindowedView,
};
use tokio::sync::RwLock;

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// Everything the API needs to serve requests.
pub struct AppState {
    /// Loaded configuration.
    pub config: TagwatchConfig,

    /// Scan lifecycle and the live device registry.
    pub controller: Arc<ScanController>,

    /// Persisted devices and events.
    pub store: Arc<Storage>,

    /// Recent / history reads over `store`.
    pub view: WindowedView,
}

impl AppState {
    /// Wires a controller and view around `session` and `store`.
    #[must_use]
    pub fn new(config: TagwatchConfig, session: Arc<dyn ScanSession>, store: Arc<Storage>) -> Self {
        let registry = DeviceRegistry::new(Classifier::default(), config.registry_options());
        let controller = ScanController::new(
            session,
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            Arc::new(config.allow_list()),
            registry,
        );
        let view = WindowedView::new(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            config.recent_window(),
        );

        Self {
            config,
            controller,
            store,
            view,
        }
    }

    /// Wraps the state for sharing with the router.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagwatch_core::LocalScanSession;

    #[test]
    fn test_new_state_is_idle() {
        let state = AppState::new(
            TagwatchConfig::default(),
            Arc::new(LocalScanSession::new()),
            Arc::new(Storage::in_memory()),
        );
        assert!(!state.controller.is_scanning());
        assert_eq!(state.view.window(), state.config.recent_window());
    }

    #[test]
    fn test_trusted_devices_reach_controller() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(LocalScanSession::new());
        let mut config = TagwatchConfig::default();
        config.trust.trusted_devices = vec!["MY-PHONE".to_string()];

        let store = Arc::new(Storage::open(dir.path()).unwrap());
        let state = AppState::new(config, Arc::clone(&session) as _, store);
        state.controller.start();
        session.deliver_batch(vec![tagwatch_core::RawDevice {
            id: "MY-PHONE".to_string(),
            is_trusted: false,
            name: "Phone".to_string(),
            rssi: -40,
            payload: tagwatch_core::AdvertisementPayload::default(),
        }]);
        state.controller.stop();

        let reopened = Storage::open(dir.path()).unwrap();
        let records = reopened.query_devices().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_trusted);
    }
}
