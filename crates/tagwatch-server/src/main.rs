//! # tagwatch-server
//!
//! HTTP server for the tagwatch Bluetooth tracker monitor.
//!
//! This binary provides:
//! - REST API for scan control and device history
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, without a radio backend
//! cargo run --package tagwatch-server
//!
//! # With BlueZ scanning
//! cargo run --package tagwatch-server --features bluetooth
//! ```
//!
//! The configuration file defaults to `/etc/tagwatch/config.toml` and can be
//! moved with `TAGWATCH_CONFIG`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tagwatch_core::config::default_config_path;
use tagwatch_core::{ScanSession, Storage, TagwatchConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

use tagwatch_server::state::AppState;
use tagwatch_server::{api, logging, watchdog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match std::env::var_os("TAGWATCH_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => default_config_path()?,
    };
    let config = TagwatchConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    logging::init(&config.server)?;
    info!(config = %config_path.display(), "Starting tagwatch-server");

    let store = if config.storage.in_memory {
        warn!("in-memory storage: sightings are lost on restart");
        Storage::in_memory()
    } else {
        let data_dir = config.data_dir()?;
        info!(data_dir = %data_dir.display(), "opening device store");
        Storage::open(data_dir)?
    };

    let session = scan_session(&config).await?;
    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address))?;

    let state = AppState::new(config, session, Arc::new(store));
    let controller = Arc::clone(&state.controller);
    let _watchdog = watchdog::spawn(&controller);

    let app = api::create_router(state.shared());
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.stop();
    info!("tagwatch-server stopped");
    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn scan_session(config: &TagwatchConfig) -> anyhow::Result<Arc<dyn ScanSession>> {
    use std::time::Duration;

    let interval = Duration::from_millis(config.scan.batch_interval_ms);
    let session = tagwatch_core::BluezScanSession::new(interval).await?;
    Ok(Arc::new(session))
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn scan_session(_config: &TagwatchConfig) -> anyhow::Result<Arc<dyn ScanSession>> {
    warn!("built without the `bluetooth` feature; scans will not see any devices");
    Ok(Arc::new(tagwatch_core::LocalScanSession::new()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
