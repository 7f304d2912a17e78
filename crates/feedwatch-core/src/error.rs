//! Error types for feedwatch operations.
//!
//! This module defines [`WatchError`], the error enum shared by the config,
//! monitor and CLI crates. None of these errors are fatal to a running
//! monitor: validation failures keep the previous value, delivery failures are
//! logged and dropped, and unreadable settings fall back to defaults.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`WatchError`].
pub type Result<T> = std::result::Result<T, WatchError>;

/// A single configuration field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRejection {
    /// Persisted key of the field (e.g. `startTime`)
    pub field: String,
    /// Value that was proposed
    pub value: String,
    /// Why it was rejected
    pub reason: String,
}

impl FieldRejection {
    /// Create a new field rejection.
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}='{}' ({})", self.field, self.value, self.reason)
    }
}

/// Error type for all feedwatch operations.
#[derive(Debug, Error)]
pub enum WatchError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A single proposed value is invalid
    #[error("Invalid config value {0}")]
    ConfigValidation(FieldRejection),

    /// An update was applied partially; the listed fields kept their prior values
    #[error("{}", summarize_rejections(.rejections))]
    ConfigRejected { rejections: Vec<FieldRejection> },

    // =========================================================================
    // Settings Persistence Errors
    // =========================================================================
    /// Settings file could not be read
    #[error("Failed to read settings from {path}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file could not be written
    #[error("Failed to write settings to {path}")]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not a valid key-value document
    #[error("Invalid settings file {path}: {message}")]
    SettingsParse { path: PathBuf, message: String },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Home directory could not be determined
    #[error("Home directory not found")]
    HomeNotFound,

    /// Settings watcher could not be started
    #[error("Failed to watch settings file {path}: {message}")]
    WatcherInit { path: PathBuf, message: String },

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// Notification delivery failed
    #[error("Notification failed via {notifier}: {message}")]
    Notify { notifier: String, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in feedwatch)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize_rejections(rejections: &[FieldRejection]) -> String {
    let fields = rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Rejected {} config field(s): {}", rejections.len(), fields)
}

impl WatchError {
    /// Create a single-field validation error
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConfigValidation(FieldRejection::new(field, value, reason))
    }

    /// Create a settings parse error from a YAML error
    pub fn yaml_parse(path: impl Into<PathBuf>, source: &serde_yaml::Error) -> Self {
        Self::SettingsParse {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Create a notification error
    pub fn notify(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notify {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Fields rejected by this error, if it is a validation error.
    pub fn rejections(&self) -> &[FieldRejection] {
        match self {
            Self::ConfigValidation(rejection) => std::slice::from_ref(rejection),
            Self::ConfigRejected { rejections } => rejections,
            _ => &[],
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation(_) | Self::ConfigRejected { .. } | Self::SettingsParse { .. }
        )
    }

    /// Returns true if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Notify { .. } | Self::SettingsRead { .. })
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigValidation(_) | Self::ConfigRejected { .. } => {
                Some("Times use 24-hour HH:mm, weekdays are 1 (Monday) to 7 (Sunday)")
            }
            Self::SettingsParse { .. } => {
                Some("Fix or delete ~/.feedwatch/settings.yaml; defaults are used meanwhile")
            }
            Self::Notify { .. } => Some("Check the bot token, chat id and network connectivity"),
            Self::HomeNotFound => Some("Pass --settings and --log-dir explicitly"),
            _ => None,
        }
    }
}
