//! Persisted settings record.
//!
//! Settings live in a flat YAML document, `~/.feedwatch/settings.yaml` by
//! default:
//!
//! ```yaml
//! timeoutSeconds: 30
//! periodicSeconds: 0
//! timeRangeEnabled: false
//! startTime: "09:00"
//! endTime: "17:00"
//! activeDays: "1,2,3,4,5"
//! botToken: ""
//! chatId: ""
//! ```
//!
//! Loading never fails. A missing file yields defaults; an unreadable or
//! non-mapping document yields defaults with a warning; each key is then
//! extracted on its own and an invalid value falls back to its default.
//!
//! That fallback is for startup only. A running monitor re-reads the file
//! with [`Settings::parse_update`], which keeps invalid values as they are so
//! that applying them rejects them and the previous value stays in effect.

use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use feedwatch_core::{FieldRejection, Result, WatchError};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::types::{
    DEFAULT_ACTIVE_DAYS, DEFAULT_END_TIME, DEFAULT_PERIODIC_SECS, DEFAULT_START_TIME,
    DEFAULT_TIMEOUT_SECS, MAX_INTERVAL_SECS, MonitorSettings, parse_active_days,
    parse_time_of_day,
};
use crate::update::ConfigUpdate;

/// File name of the settings document inside `~/.feedwatch`.
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Default settings path (`~/.feedwatch/settings.yaml`).
pub fn default_settings_path() -> Result<PathBuf> {
    feedwatch_core::app_dir()
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .ok_or(WatchError::HomeNotFound)
}

/// The persisted settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// No-data timeout in seconds (> 0)
    pub timeout_seconds: i64,
    /// Re-alert interval in seconds (0 = disabled)
    pub periodic_seconds: i64,
    /// Whether the time-window gate is active
    pub time_range_enabled: bool,
    /// Window start, `HH:mm`
    pub start_time: String,
    /// Window end, `HH:mm`
    pub end_time: String,
    /// Comma-separated ISO weekday numbers
    pub active_days: String,
    /// Telegram bot token (empty = transport not configured)
    pub bot_token: String,
    /// Telegram chat id (empty = transport not configured)
    pub chat_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS as i64,
            periodic_seconds: DEFAULT_PERIODIC_SECS as i64,
            time_range_enabled: false,
            start_time: DEFAULT_START_TIME.to_string(),
            end_time: DEFAULT_END_TIME.to_string(),
            active_days: DEFAULT_ACTIVE_DAYS.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults on any problem.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No saved settings found, using defaults");
            return Self::default();
        }

        match Self::read_from(path) {
            Ok(settings) => {
                info!(path = %path.display(), "Settings loaded");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable settings, using defaults");
                Self::default()
            }
        }
    }

    /// Read settings, failing only when the file cannot be read or is not a
    /// key-value document. Invalid individual fields still fall back.
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| WatchError::SettingsRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(path, &content)
    }

    /// Parse a settings document. `path` is only used for error context.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        parse_mapping(path, content).map(|mapping| Self::from_mapping(&mapping))
    }

    /// Parse the monitor/schedule keys of a settings document without any
    /// fallback. Absent keys stay unset; invalid values are kept for
    /// [`ConfigUpdate::apply_to`] to reject.
    pub fn parse_update(path: &Path, content: &str) -> Result<ConfigUpdate> {
        let mapping = parse_mapping(path, content)?;
        let fields = Fields(&mapping);
        let mut malformed = Vec::new();

        let timeout_seconds = keep(fields.raw_int("timeoutSeconds"), &mut malformed);
        let periodic_seconds = keep(fields.raw_int("periodicSeconds"), &mut malformed);
        let time_range_enabled = keep(fields.raw_bool("timeRangeEnabled"), &mut malformed);
        let start_time = keep(fields.raw_text("startTime"), &mut malformed);
        let end_time = keep(fields.raw_text("endTime"), &mut malformed);
        let active_days = keep(fields.raw_text("activeDays"), &mut malformed);

        Ok(ConfigUpdate {
            timeout_seconds,
            periodic_seconds,
            time_range_enabled,
            start_time,
            end_time,
            active_days,
            malformed,
        })
    }

    fn from_mapping(mapping: &Mapping) -> Self {
        let defaults = Self::default();
        let fields = Fields(mapping);
        let interval = |v: i64| u64::try_from(v).is_ok_and(|v| v <= MAX_INTERVAL_SECS);

        Self {
            timeout_seconds: fields
                .int("timeoutSeconds", |v| v > 0 && interval(v))
                .unwrap_or(defaults.timeout_seconds),
            periodic_seconds: fields
                .int("periodicSeconds", interval)
                .unwrap_or(defaults.periodic_seconds),
            time_range_enabled: fields
                .bool("timeRangeEnabled")
                .unwrap_or(defaults.time_range_enabled),
            start_time: fields
                .text("startTime", |v| parse_time_of_day("startTime", v).is_ok())
                .unwrap_or(defaults.start_time),
            end_time: fields
                .text("endTime", |v| parse_time_of_day("endTime", v).is_ok())
                .unwrap_or(defaults.end_time),
            active_days: fields
                .text("activeDays", |v| parse_active_days(v).is_ok())
                .unwrap_or(defaults.active_days),
            bot_token: fields.text("botToken", |_| true).unwrap_or_default(),
            chat_id: fields.text("chatId", |_| true).unwrap_or_default(),
        }
    }

    /// Write settings atomically (temp file + rename), creating the parent
    /// directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WatchError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| WatchError::internal(format!("Failed to serialize settings: {e}")))?;

        let write_err = |source| WatchError::SettingsWrite {
            path: path.to_path_buf(),
            source,
        };
        let temp_path = path.with_extension("yaml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(write_err)?;
        file.write_all(yaml.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        fs::rename(&temp_path, path).map_err(write_err)?;

        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// The monitor/schedule part of these settings as an unvalidated update.
    pub fn to_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            timeout_seconds: Some(self.timeout_seconds),
            periodic_seconds: Some(self.periodic_seconds),
            time_range_enabled: Some(self.time_range_enabled),
            start_time: Some(self.start_time.clone()),
            end_time: Some(self.end_time.clone()),
            active_days: Some(self.active_days.clone()),
            malformed: Vec::new(),
        }
    }

    /// Validated snapshot for startup. Invalid fields take their defaults.
    pub fn validated(&self) -> MonitorSettings {
        let applied = self.to_update().apply_to(&MonitorSettings::default());
        for rejection in &applied.rejections {
            warn!(%rejection, "Invalid setting, using default");
        }
        applied.settings
    }

    /// Record an update in the persisted form. Only fields that pass
    /// validation are written; the rejected ones are returned as an error
    /// after the valid ones have been stored in `self`.
    pub fn merge(&mut self, update: &ConfigUpdate) -> Result<()> {
        let applied = update.apply_to(&self.validated());
        let rejected = |field: &str| applied.rejections.iter().any(|r| r.field == field);

        if let Some(v) = update.timeout_seconds.filter(|_| !rejected("timeoutSeconds")) {
            self.timeout_seconds = v;
        }
        if let Some(v) = update.periodic_seconds.filter(|_| !rejected("periodicSeconds")) {
            self.periodic_seconds = v;
        }
        if let Some(v) = update.time_range_enabled {
            self.time_range_enabled = v;
        }
        if let Some(v) = update.start_time.as_ref().filter(|_| !rejected("startTime")) {
            self.start_time = v.clone();
        }
        if let Some(v) = update.end_time.as_ref().filter(|_| !rejected("endTime")) {
            self.end_time = v.clone();
        }
        if let Some(v) = update.active_days.as_ref().filter(|_| !rejected("activeDays")) {
            self.active_days = v.clone();
        }

        applied.error().map_or(Ok(()), Err)
    }

    /// Whether transport credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }

    /// Bot token shortened for logs and display.
    pub fn masked_bot_token(&self) -> String {
        let prefix: String = self.bot_token.chars().take(10).collect();
        if prefix.is_empty() {
            "<unset>".to_string()
        } else {
            format!("{prefix}...")
        }
    }
}

/// Typed field extraction from a YAML mapping.
///
/// The `raw_*` accessors return `None` for an absent key and a rejection for
/// a value of the wrong type. The lenient accessors also check the value and
/// log a warning before falling back.
struct Fields<'a>(&'a Mapping);

impl Fields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn raw_int(&self, key: &str) -> Option<std::result::Result<i64, FieldRejection>> {
        let value = self.get(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        Some(parsed.ok_or_else(|| wrong_type(key, value, "expected a whole number of seconds")))
    }

    fn raw_bool(&self, key: &str) -> Option<std::result::Result<bool, FieldRejection>> {
        let value = self.get(key)?;
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        Some(parsed.ok_or_else(|| wrong_type(key, value, "expected true or false")))
    }

    /// Strings, plus numbers rendered as text (`activeDays: 1`, numeric chat ids).
    fn raw_text(&self, key: &str) -> Option<std::result::Result<String, FieldRejection>> {
        let value = self.get(key)?;
        let text = match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        Some(text.ok_or_else(|| wrong_type(key, value, "expected text")))
    }

    fn int(&self, key: &str, valid: impl Fn(i64) -> bool) -> Option<i64> {
        lenient(key, self.raw_int(key)?, |v| valid(*v))
    }

    fn bool(&self, key: &str) -> Option<bool> {
        lenient(key, self.raw_bool(key)?, |_| true)
    }

    fn text(&self, key: &str, valid: impl Fn(&str) -> bool) -> Option<String> {
        lenient(key, self.raw_text(key)?, |t| valid(t))
    }
}

fn lenient<T: std::fmt::Debug>(
    key: &str,
    raw: std::result::Result<T, FieldRejection>,
    valid: impl Fn(&T) -> bool,
) -> Option<T> {
    match raw {
        Ok(value) if valid(&value) => Some(value),
        Ok(value) => {
            warn!(key, value = ?value, "Invalid setting, using default");
            None
        }
        Err(rejection) => {
            warn!(%rejection, "Invalid setting, using default");
            None
        }
    }
}

fn keep<T>(
    raw: Option<std::result::Result<T, FieldRejection>>,
    malformed: &mut Vec<FieldRejection>,
) -> Option<T> {
    match raw? {
        Ok(value) => Some(value),
        Err(rejection) => {
            malformed.push(rejection);
            None
        }
    }
}

fn wrong_type(key: &str, value: &Value, reason: &str) -> FieldRejection {
    let shown = serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| kind(value).to_string());
    FieldRejection::new(key, shown, reason)
}

/// Parse a document that must be a key-value mapping. An empty document is
/// an empty mapping.
fn parse_mapping(path: &Path, content: &str) -> Result<Mapping> {
    let value: Value =
        serde_yaml::from_str(content).map_err(|e| WatchError::yaml_parse(path, &e))?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(WatchError::SettingsParse {
            path: path.to_path_buf(),
            message: format!("expected a key-value mapping, found {}", kind(&other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
