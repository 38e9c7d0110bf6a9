//! Device listing API endpoints.
//!
//! The live list comes from the running session's registry. Recent and
//! history lists come from the store, split by the configured window.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagwatch_core::{
    ConnectionStatus, DeviceEvent, DeviceRecord, DeviceStore, TagwatchError, TrackerKind,
};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the devices router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_live_devices).delete(clear_devices))
        .route("/recent", get(list_recent_devices))
        .route("/history", get(list_history_devices))
        .route("/{id}/events", get(list_device_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A device record with its presentation fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "5C:4A:1F:00:12:9B",
    "name": "AirTag",
    "display_name": "AirTag",
    "first_seen": "2025-01-15T03:30:00Z",
    "last_seen": "2025-01-15T03:31:40Z",
    "signal_strength": -55,
    "is_trusted": false,
    "tracker_kind": "airtag",
    "tracker_name": "Apple AirTag",
    "vendor": "Apple",
    "connection_status": "unknown",
    "connection_description": "Status unknown",
    "is_tracking_mode": true,
    "event_count": 4,
    "is_potential_risk": true
}))]
pub struct DeviceResponse {
    /// Device identifier.
    pub id: String,
    /// Advertised name, possibly empty.
    pub name: String,
    /// Name to show, `Unknown` when none was advertised.
    pub display_name: String,
    /// First observation.
    pub first_seen: DateTime<Utc>,
    /// Latest observation.
    pub last_seen: DateTime<Utc>,
    /// Signal strength in dBm at the latest observation.
    pub signal_strength: i16,
    /// Whether the device is on the trust list.
    pub is_trusted: bool,
    /// Tracker family.
    pub tracker_kind: TrackerKind,
    /// Human-readable tracker family.
    pub tracker_name: String,
    /// Vendor label.
    pub vendor: String,
    /// Decoded connection status.
    pub connection_status: ConnectionStatus,
    /// Human-readable connection status.
    pub connection_description: String,
    /// Broadcasting without its owner nearby.
    pub is_tracking_mode: bool,
    /// Number of observations.
    pub event_count: u64,
    /// Untrusted, vendor-matched tracker.
    pub is_potential_risk: bool,
}

impl From<DeviceRecord> for DeviceResponse {
    fn from(record: DeviceRecord) -> Self {
        Self {
            display_name: record.display_name().to_string(),
            tracker_name: record.tracker_kind.display_name().to_string(),
            is_potential_risk: record.is_potential_risk(),
            connection_description: record.connection_status.description().to_string(),
            is_tracking_mode: record.connection_status.is_tracking_mode(),
            id: record.id,
            name: record.name,
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            signal_strength: record.signal_strength,
            is_trusted: record.is_trusted,
            tracker_kind: record.tracker_kind,
            vendor: record.vendor,
            connection_status: record.connection_status,
            event_count: record.event_count,
        }
    }
}

/// A list of devices, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [],
    "count": 0,
    "potential_risks": 0,
    "window_secs": 200,
    "generated_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct DeviceListResponse {
    /// Devices, most recently seen first.
    pub devices: Vec<DeviceResponse>,

    /// Number of devices.
    #[schema(example = 0, minimum = 0)]
    pub count: usize,

    /// Devices flagged as potential risks.
    #[schema(example = 0, minimum = 0)]
    pub potential_risks: usize,

    /// Recent window used for the split, absent for the live list.
    #[schema(example = 200)]
    pub window_secs: Option<u64>,

    /// When the list was produced.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub generated_at_utc: String,
}

impl DeviceListResponse {
    fn new(records: Vec<DeviceRecord>, window_secs: Option<u64>) -> Self {
        let devices: Vec<DeviceResponse> = records.into_iter().map(DeviceResponse::from).collect();
        Self {
            count: devices.len(),
            potential_risks: devices.iter().filter(|d| d.is_potential_risk).count(),
            devices,
            window_secs,
            generated_at_utc: Utc::now().to_rfc3339(),
        }
    }
}

/// One stored sighting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceEventResponse {
    /// Event id.
    pub id: Uuid,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Signal strength in dBm.
    pub signal_strength: i16,
}

impl From<DeviceEvent> for DeviceEventResponse {
    fn from(event: DeviceEvent) -> Self {
        Self {
            id: event.id,
            timestamp: event.timestamp,
            signal_strength: event.signal_strength,
        }
    }
}

/// Stored sightings for one device, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceEventsResponse {
    /// Device the events belong to.
    #[schema(example = "5C:4A:1F:00:12:9B")]
    pub device_id: String,

    /// Events, newest first.
    pub events: Vec<DeviceEventResponse>,

    /// Number of events.
    #[schema(example = 4, minimum = 0)]
    pub count: usize,
}

/// Result of clearing stored devices.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices_removed": 12,
    "cleared_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct ClearDevicesResponse {
    /// Number of device records removed.
    #[schema(example = 12, minimum = 0)]
    pub devices_removed: usize,

    /// When the store was cleared.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub cleared_at_utc: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List devices seen in the current scan session.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listLiveDevices",
    summary = "List devices in the current session",
    description = "Returns the live registry: every device seen since the \
        current (or last) scan started, most recently seen first.",
    responses(
        (status = 200, description = "Live devices", body = DeviceListResponse)
    )
)]
pub async fn list_live_devices(State(state): State<SharedState>) -> Json<DeviceListResponse> {
    let state_guard = state.read().await;
    Json(DeviceListResponse::new(
        state_guard.controller.snapshot(),
        None,
    ))
}

/// List stored devices seen inside the recent window.
#[utoipa::path(
    get,
    path = "/api/devices/recent",
    tag = "devices",
    operation_id = "listRecentDevices",
    summary = "List recently seen devices",
    description = "Returns stored devices whose last sighting lies inside the \
        recent window (200 seconds by default).",
    responses(
        (status = 200, description = "Recent devices", body = DeviceListResponse),
        (status = 500, description = "Store unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn list_recent_devices(
    State(state): State<SharedState>,
) -> ApiResult<Json<DeviceListResponse>> {
    let state_guard = state.read().await;
    let records = state_guard.view.recent(Utc::now())?;
    Ok(Json(DeviceListResponse::new(
        records,
        Some(state_guard.config.window.recent_secs),
    )))
}

/// List stored devices last seen before the recent window.
#[utoipa::path(
    get,
    path = "/api/devices/history",
    tag = "devices",
    operation_id = "listHistoryDevices",
    summary = "List device history",
    description = "Returns stored devices that have not been seen within the \
        recent window.",
    responses(
        (status = 200, description = "Historical devices", body = DeviceListResponse),
        (status = 500, description = "Store unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn list_history_devices(
    State(state): State<SharedState>,
) -> ApiResult<Json<DeviceListResponse>> {
    let state_guard = state.read().await;
    let records = state_guard.view.history(Utc::now())?;
    Ok(Json(DeviceListResponse::new(
        records,
        Some(state_guard.config.window.recent_secs),
    )))
}

/// List stored sightings of one device.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/events",
    tag = "devices",
    operation_id = "listDeviceEvents",
    summary = "List sightings of a device",
    params(
        ("id" = String, Path, description = "Device identifier", example = "5C:4A:1F:00:12:9B")
    ),
    responses(
        (status = 200, description = "Device events", body = DeviceEventsResponse),
        (status = 404, description = "Unknown device", body = super::error::ErrorResponse)
    )
)]
pub async fn list_device_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceEventsResponse>> {
    let state_guard = state.read().await;
    let store = &state_guard.store;

    let events = store.query_events_for(&id)?;
    if events.is_empty() && !store.query_devices()?.iter().any(|r| r.id == id) {
        return Err(TagwatchError::DeviceNotFound(id).into());
    }

    let events: Vec<DeviceEventResponse> = events.into_iter().map(Into::into).collect();
    Ok(Json(DeviceEventsResponse {
        device_id: id,
        count: events.len(),
        events,
    }))
}

/// Remove every stored device and event.
#[utoipa::path(
    delete,
    path = "/api/devices",
    tag = "devices",
    operation_id = "clearDevices",
    summary = "Clear stored devices",
    description = "Deletes all stored device records and sighting events. The \
        live list of a running scan is not affected.",
    responses(
        (status = 200, description = "Store cleared", body = ClearDevicesResponse),
        (status = 500, description = "Store unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn clear_devices(
    State(state): State<SharedState>,
) -> ApiResult<Json<ClearDevicesResponse>> {
    let state_guard = state.write().await;
    let devices_removed = state_guard.store.query_devices()?.len();
    state_guard.store.clear_all()?;
    info!(devices_removed, "cleared stored devices");

    Ok(Json(ClearDevicesResponse {
        devices_removed,
        cleared_at_utc: Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(kind: TrackerKind, trusted: bool) -> DeviceRecord {
        let seen = Utc.timestamp_opt(1_000, 0).unwrap();
        DeviceRecord {
            id: "5C:4A:1F:00:12:9B".to_string(),
            name: String::new(),
            first_seen: seen,
            last_seen: seen,
            signal_strength: -60,
            is_trusted: trusted,
            tracker_kind: kind,
            vendor: kind.vendor().to_string(),
            connection_status: ConnectionStatus::Unknown,
            event_count: 2,
        }
    }

    #[test]
    fn test_device_response_flags_risk() {
        let response = DeviceResponse::from(record(TrackerKind::Airtag, false));
        assert!(response.is_potential_risk);
        assert_eq!(response.display_name, "Unknown");
        assert_eq!(response.tracker_name, "Apple AirTag");

        let trusted = DeviceResponse::from(record(TrackerKind::Airtag, true));
        assert!(!trusted.is_potential_risk);
    }

    #[test]
    fn test_device_response_describes_connection() {
        let unknown = DeviceResponse::from(record(TrackerKind::Smarttag, false));
        assert_eq!(unknown.connection_description, "Status unknown");
        assert!(unknown.is_tracking_mode);

        let mut connected = record(TrackerKind::Smarttag, false);
        connected.connection_status = ConnectionStatus::Connected;
        let connected = DeviceResponse::from(connected);
        assert_eq!(connected.connection_description, "Owner connected");
        assert!(!connected.is_tracking_mode);

        let json = serde_json::to_string(&connected).unwrap();
        assert!(json.contains("\"connection_description\":\"Owner connected\""));
        assert!(json.contains("\"is_tracking_mode\":false"));
    }

    #[test]
    fn test_device_list_counts() {
        let list = DeviceListResponse::new(
            vec![
                record(TrackerKind::Tile, false),
                record(TrackerKind::Generic, false),
            ],
            Some(200),
        );
        assert_eq!(list.count, 2);
        assert_eq!(list.potential_risks, 1);

        let json = serde_json::to_string(&list).unwrap();
        assert!(json.contains("\"window_secs\":200"));
        assert!(json.contains("\"tracker_kind\":\"tile\""));
    }
}
