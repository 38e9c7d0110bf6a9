//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `scan` - Scan start, stop, and status
//! - `devices` - Live, recent, and historical devices and their sightings
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;
pub mod scan;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                     - Health check
/// /api
/// ├── /scan                   - Scan status
/// ├── /scan/start             - Start a scan (optional duration)
/// ├── /scan/stop              - Stop the scan
/// ├── /devices                - Live devices (GET), clear store (DELETE)
/// ├── /devices/recent         - Stored devices inside the window
/// ├── /devices/history        - Stored devices outside the window
/// ├── /devices/{id}/events    - Sightings of one device
/// └── /openapi.json           - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/scan", scan::router())
                .nest("/devices", devices::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
