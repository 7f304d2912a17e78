//! # feedwatch-core
//!
//! Core errors and utilities shared by the feedwatch crates.
//!
//! This crate provides:
//! - [`WatchError`] - Error type for configuration, persistence and delivery failures
//! - [`logging`] - Tracing setup and the outage/notification log macros
//!
//! ## Example
//!
//! ```no_run
//! use feedwatch_core::{WatchError, logging};
//!
//! fn main() -> feedwatch_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let err = WatchError::validation("startTime", "25:99", "expected HH:mm");
//!     tracing::warn!(error = %err, "rejected config field");
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{FieldRejection, Result, WatchError};
pub use logging::{LogGuard, init_logging};

/// Name of the per-user feedwatch directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".feedwatch";

/// Returns `~/.feedwatch`, if a home directory can be determined.
pub fn app_dir() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DIR_NAME))
}
