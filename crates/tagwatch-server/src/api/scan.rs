//! Scan control API endpoints.
//!
//! A scan clears the live registry, takes over the radio session, and folds
//! every batch into the registry and the store until it is stopped, either
//! explicitly or by its duration timer.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tagwatch_core::{RadioState, ScanController, ScanState};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the scan router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_scan_status))
        .route("/start", post(start_scan))
        .route("/stop", post(stop_scan))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current scan status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "scanning": true,
    "radio_state": "powered_on",
    "device_count": 3,
    "potential_risks": 1,
    "checked_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct ScanStatusResponse {
    /// Whether a scan is running.
    #[schema(example = true)]
    pub scanning: bool,

    /// Last state reported by the radio.
    pub radio_state: RadioState,

    /// Devices seen in the current session.
    #[schema(example = 3, minimum = 0)]
    pub device_count: usize,

    /// Untrusted trackers among them.
    #[schema(example = 1, minimum = 0)]
    pub potential_risks: usize,

    /// UTC timestamp of this status.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub checked_at_utc: String,
}

impl ScanStatusResponse {
    fn from_controller(controller: &ScanController) -> Self {
        let snapshot = controller.snapshot();
        Self {
            scanning: controller.state() == ScanState::Scanning,
            radio_state: controller.radio_state(),
            device_count: snapshot.len(),
            potential_risks: snapshot.iter().filter(|r| r.is_potential_risk()).count(),
            checked_at_utc: Utc::now().to_rfc3339(),
        }
    }
}

/// Query parameters for starting a scan.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StartScanQuery {
    /// Stop automatically after this many seconds.
    /// Defaults to `scan.default_duration_secs`; no limit when neither is set.
    #[param(example = 60, minimum = 1)]
    pub duration_secs: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current scan status.
#[utoipa::path(
    get,
    path = "/api/scan",
    tag = "scan",
    operation_id = "getScanStatus",
    summary = "Get scan status",
    description = "Returns whether a scan is running, the radio state, and how \
        many devices the current session has seen.",
    responses(
        (status = 200, description = "Scan status", body = ScanStatusResponse)
    )
)]
pub async fn get_scan_status(State(state): State<SharedState>) -> Json<ScanStatusResponse> {
    let state_guard = state.read().await;
    Json(ScanStatusResponse::from_controller(&state_guard.controller))
}

/// Start scanning for trackers.
///
/// Starting while a scan is running leaves it running; a duration still
/// replaces the pending stop timer.
#[utoipa::path(
    post,
    path = "/api/scan/start",
    tag = "scan",
    operation_id = "startScan",
    summary = "Start a scan",
    description = "Clears the live device list and starts scanning. When a \
        duration is given (or configured), the scan stops on its own.",
    params(StartScanQuery),
    responses(
        (status = 200, description = "Scan started", body = ScanStatusResponse),
        (status = 400, description = "Invalid duration", body = super::error::ErrorResponse)
    )
)]
pub async fn start_scan(
    State(state): State<SharedState>,
    Query(query): Query<StartScanQuery>,
) -> ApiResult<Json<ScanStatusResponse>> {
    if query.duration_secs == Some(0) {
        return Err(ApiError::BadRequest {
            error_code: "invalid_duration".to_string(),
            message: "duration_secs must be greater than 0".to_string(),
        });
    }

    let state_guard = state.read().await;
    let duration = query
        .duration_secs
        .or(state_guard.config.scan.default_duration_secs);

    let controller = &state_guard.controller;
    controller.start();
    if let Some(secs) = duration {
        controller.schedule_stop(Duration::from_secs(secs))?;
        info!(duration_secs = secs, "scan will stop automatically");
    }

    Ok(Json(ScanStatusResponse::from_controller(controller)))
}

/// Stop the running scan.
#[utoipa::path(
    post,
    path = "/api/scan/stop",
    tag = "scan",
    operation_id = "stopScan",
    summary = "Stop the scan",
    description = "Stops scanning. Safe to call when no scan is running.",
    responses(
        (status = 200, description = "Scan stopped", body = ScanStatusResponse)
    )
)]
pub async fn stop_scan(State(state): State<SharedState>) -> Json<ScanStatusResponse> {
    let state_guard = state.read().await;
    state_guard.controller.stop();
    Json(ScanStatusResponse::from_controller(&state_guard.controller))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_serialization() {
        let response = ScanStatusResponse {
            scanning: true,
            radio_state: RadioState::PoweredOn,
            device_count: 2,
            potential_risks: 1,
            checked_at_utc: "2025-01-15T03:30:00Z".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"scanning\":true"));
        assert!(json.contains("\"radio_state\":\"powered_on\""));
    }
}
