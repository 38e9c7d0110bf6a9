//! OpenAPI specification generation for the tagwatch API.
//!
//! The document is served at `/api/openapi.json` and written to disk by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use tagwatch_core::{ConnectionStatus, RadioState, TrackerKind};
use utoipa::OpenApi;

use super::devices::{
    ClearDevicesResponse, DeviceEventResponse, DeviceEventsResponse, DeviceListResponse,
    DeviceResponse,
};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::scan::ScanStatusResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for tagwatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tagwatch API",
        version = "0.1.0",
        description = r#"
# tagwatch API

tagwatch scans for Bluetooth Low Energy item trackers (AirTag, SmartTag, Tile,
Chipolo, Google Find My Device, Pebblebee) and keeps a history of every device
it has seen.

## Overview

1. **Scanning**: Start and stop scans. A scan can stop itself after a duration.
2. **Live devices**: Every device seen in the current scan, classified by vendor.
3. **Recent and history**: Stored devices split by a recent window (200 s by default).
4. **Sightings**: Every observation of a device, newest first.

A device is flagged `is_potential_risk` when it is a recognised tracker that is
not on the trusted list.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local tagwatch server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and service status"
        ),
        (
            name = "scan",
            description = "Scan lifecycle control"
        ),
        (
            name = "devices",
            description = "Live, recent, and historical device lists"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Scan endpoints
        super::scan::get_scan_status,
        super::scan::start_scan,
        super::scan::stop_scan,
        // Device endpoints
        super::devices::list_live_devices,
        super::devices::list_recent_devices,
        super::devices::list_history_devices,
        super::devices::list_device_events,
        super::devices::clear_devices,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Scan types
            ScanStatusResponse,
            RadioState,
            // Device types
            DeviceResponse,
            DeviceListResponse,
            DeviceEventResponse,
            DeviceEventsResponse,
            ClearDevicesResponse,
            TrackerKind,
            ConnectionStatus,
        )
    )
)]
pub struct ApiDoc;
