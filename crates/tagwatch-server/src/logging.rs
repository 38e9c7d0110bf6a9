//! Logging setup.
//!
//! - **Production**: JSON to daily-rolling files plus compact stdout for journald
//! - **Development**: pretty stdout with span open/close events
//!
//! The filter comes from `RUST_LOG`, then `TAGWATCH_LOG_LEVEL`, then `info`.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tagwatch_core::config::ServerConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback filter variable consulted when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "TAGWATCH_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "tagwatch";

// Writer guards must outlive the subscriber or buffered lines are lost.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Installs the global subscriber for `server`'s logging mode.
///
/// # Errors
///
/// Returns an error if the filter does not parse or the log directory
/// cannot be created.
pub fn init(server: &ServerConfig) -> anyhow::Result<()> {
    let filter = env_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref())?;

    if server.production {
        init_production(filter)
    } else {
        init_development(filter);
        Ok(())
    }
}

/// Builds the filter from `RUST_LOG`, falling back to `level` or `info`.
fn env_filter(level: Option<&str>) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .context("invalid log filter")
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps and does not render ANSI.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = GUARDS.set((file_guard, stdout_guard));
    Ok(())
}

fn init_development(filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

/// Log directory for the current platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/tagwatch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "tagwatch")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
