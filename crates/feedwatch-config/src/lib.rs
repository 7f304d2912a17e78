//! Configuration for feedwatch.
//!
//! - [`types`] holds the validated [`MonitorSettings`] snapshot: the no-data
//!   timeout, the periodic re-alert interval and the alerting time window.
//! - [`update`] applies raw field changes one at a time, keeping the previous
//!   value for anything that fails validation.
//! - [`settings`] persists the record to `~/.feedwatch/settings.yaml`.
//! - [`watcher`] reloads the record when the file changes on disk.
//!
//! ## Example
//!
//! ```no_run
//! use feedwatch_config::{ConfigUpdate, Settings};
//!
//! let path = feedwatch_config::default_settings_path()?;
//! let mut settings = Settings::load_from(&path);
//!
//! settings.merge(&ConfigUpdate::new().timeout_seconds(45))?;
//! settings.save_to(&path)?;
//!
//! let snapshot = settings.validated();
//! assert_eq!(snapshot.monitor.timeout().as_secs(), 45);
//! # Ok::<(), feedwatch_core::WatchError>(())
//! ```

pub mod settings;
pub mod types;
pub mod update;
pub mod watcher;

pub use settings::{SETTINGS_FILE_NAME, Settings, default_settings_path};
pub use types::{
    ActiveDays, MAX_INTERVAL_SECS, MonitorConfig, MonitorSettings, ScheduleConfig,
    format_time_of_day, parse_active_days, parse_time_of_day, weekday_from_number,
};
pub use update::{AppliedUpdate, ConfigUpdate};
pub use watcher::{SettingsEvent, SettingsWatcher};
