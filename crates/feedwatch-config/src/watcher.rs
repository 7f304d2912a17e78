//! Hot reload of the settings file.
//!
//! [`SettingsWatcher`] watches the directory holding the settings file with a
//! debounced `notify` watcher and emits a [`SettingsEvent`] whenever the file
//! is written, replaced or removed. The parent directory is watched rather
//! than the file itself so that atomic temp-file-and-rename saves are seen.
//!
//! ## Example
//!
//! ```no_run
//! use feedwatch_config::watcher::{SettingsEvent, SettingsWatcher};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> feedwatch_core::Result<()> {
//!     let path = PathBuf::from("/home/me/.feedwatch/settings.yaml");
//!     let (_watcher, mut rx) = SettingsWatcher::new(&path)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             SettingsEvent::Reloaded { update, .. } => println!("timeout now {:?}", update.timeout_seconds),
//!             SettingsEvent::Removed => println!("settings file removed"),
//!             SettingsEvent::Error { error } => eprintln!("bad settings: {error}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feedwatch_core::{Result, WatchError};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::settings::Settings;
use crate::update::ConfigUpdate;

/// Default debounce duration in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Default channel buffer size for events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 16;

/// Events emitted by the settings watcher.
#[derive(Debug, Clone)]
pub enum SettingsEvent {
    /// The file was written and re-read successfully.
    Reloaded {
        /// The file read leniently, as at startup (invalid fields defaulted)
        settings: Settings,
        /// The monitor/schedule keys as written, invalid values included
        update: ConfigUpdate,
    },

    /// The file was deleted. The running configuration is left as is.
    Removed,

    /// The file changed but could not be read or parsed.
    Error {
        /// Error message
        error: String,
    },
}

impl SettingsEvent {
    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Debounced watcher for the settings file.
pub struct SettingsWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    path: PathBuf,
}

impl SettingsWatcher {
    /// Watch `path` with the default debounce.
    pub fn new(path: &Path) -> Result<(Self, mpsc::Receiver<SettingsEvent>)> {
        Self::with_debounce(path, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Watch `path`, coalescing changes within `debounce`.
    ///
    /// The parent directory is created if it does not exist yet.
    pub fn with_debounce(
        path: &Path,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<SettingsEvent>)> {
        let init_err = |message: String| WatchError::WatcherInit {
            path: path.to_path_buf(),
            message,
        };

        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| init_err("settings path has no file name".to_string()))?;
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };

        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| WatchError::DirectoryCreation {
                path: dir.clone(),
                source: e,
            })?;
            info!("Created settings directory: {:?}", dir);
        }

        let (event_tx, event_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let settings_path = path.to_path_buf();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let touched: Vec<&EventKind> = events
                        .iter()
                        .filter(|event| {
                            event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()))
                        })
                        .map(|event| &event.kind)
                        .collect();

                    if let Some(event) = classify(&touched, &settings_path)
                        && event_tx.blocking_send(event).is_err()
                    {
                        debug!("Settings event receiver dropped");
                    }
                }
                Err(errors) => {
                    for error in errors {
                        error!("Settings watcher error: {:?}", error);
                        let _ = event_tx.blocking_send(SettingsEvent::Error {
                            error: format!("{error:?}"),
                        });
                    }
                }
            }
        })
        .map_err(|e| init_err(format!("Failed to create debouncer: {e}")))?;

        debouncer
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| init_err(format!("Failed to watch directory {dir:?}: {e}")))?;

        info!("Watching settings file: {:?}", path);

        Ok((
            Self {
                _debouncer: debouncer,
                path: path.to_path_buf(),
            },
            event_rx,
        ))
    }

    /// The settings file being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Collapse one debounced batch into at most one event.
///
/// The file's presence on disk decides between reload and removal, so a
/// remove followed by a rename-into-place reads as a reload.
fn classify(kinds: &[&EventKind], path: &Path) -> Option<SettingsEvent> {
    let relevant = kinds.iter().any(|kind| {
        matches!(
            kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        )
    });
    if !relevant {
        return None;
    }

    if !path.exists() {
        warn!("Settings file removed: {:?}", path);
        return Some(SettingsEvent::Removed);
    }

    match read_reload(path) {
        Ok((settings, update)) => {
            debug!("Settings file changed: {:?}", path);
            Some(SettingsEvent::Reloaded { settings, update })
        }
        Err(e) => Some(SettingsEvent::Error {
            error: e.to_string(),
        }),
    }
}

fn read_reload(path: &Path) -> Result<(Settings, ConfigUpdate)> {
    let content = std::fs::read_to_string(path).map_err(|e| WatchError::SettingsRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok((
        Settings::parse(path, &content)?,
        Settings::parse_update(path, &content)?,
    ))
}
