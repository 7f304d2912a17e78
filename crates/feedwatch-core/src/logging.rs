//! Logging infrastructure for feedwatch.
//!
//! Structured logging uses the `tracing` ecosystem. The monitor writes JSON
//! lines to `~/.feedwatch/logs/feedwatch.log` and a compact human-readable
//! stream to stderr, so a long-running `feedwatch run` leaves an audit trail of
//! every outage onset, re-alert and delivery failure.
//!
//! ## Example
//!
//! ```no_run
//! use feedwatch_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("feedwatch started");
//! feedwatch_core::log_outage_event!("onset", timeout_secs = 30u64);
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Result, WatchError};

/// File name of the rolling log inside the log directory.
pub const LOG_FILE_NAME: &str = "feedwatch.log";

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the feedwatch logging system.
///
/// Sets up daily-rolled JSON file logging and stderr console logging.
/// `verbose` switches the default level from INFO to DEBUG; `RUST_LOG`
/// overrides both.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| WatchError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("feedwatch={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path (`~/.feedwatch/logs/`).
pub fn default_log_dir() -> Result<PathBuf> {
    crate::app_dir()
        .map(|dir| dir.join("logs"))
        .ok_or(WatchError::HomeNotFound)
}

/// Get the default log file path (`~/.feedwatch/logs/feedwatch.log`).
pub fn default_log_file() -> Result<PathBuf> {
    Ok(default_log_dir()?.join(LOG_FILE_NAME))
}

/// Log an outage state-machine event on the `feedwatch::outage` target.
///
/// # Example
///
/// ```ignore
/// log_outage_event!("onset");
/// log_outage_event!("periodic", cumulative_secs = 90u64);
/// ```
#[macro_export]
macro_rules! log_outage_event {
    ($event:expr) => {
        tracing::info!(
            target: "feedwatch::outage",
            event = $event,
            "outage event"
        )
    };
    ($event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "feedwatch::outage",
            event = $event,
            $($field)*,
            "outage event"
        )
    };
}

/// Log a notification delivery attempt on the `feedwatch::notify` target.
///
/// # Example
///
/// ```ignore
/// log_notification!(notifier = "telegram", success = true);
/// log_notification!(notifier = "telegram", success = false, error = "HTTP 502");
/// ```
#[macro_export]
macro_rules! log_notification {
    ($($field:tt)*) => {
        tracing::info!(
            target: "feedwatch::notify",
            $($field)*,
            "notification"
        )
    };
}
