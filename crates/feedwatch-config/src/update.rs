//! Field-by-field configuration updates.
//!
//! A [`ConfigUpdate`] carries raw, unvalidated values as they arrive from the
//! settings file, the CLI or a control panel. Applying it to the current
//! [`MonitorSettings`] validates every field on its own: valid fields replace
//! their counterparts, invalid ones keep the previous value and are reported
//! as [`FieldRejection`]s. The result is always a complete, valid snapshot.
//!
//! Values that could not even be read as the field's type (a list where a
//! number belongs) travel in [`ConfigUpdate::malformed`] and are reported the
//! same way.

use std::time::Duration;

use feedwatch_core::{FieldRejection, WatchError};

use crate::types::{MAX_INTERVAL_SECS, MonitorSettings, parse_active_days, parse_time_of_day};

/// A partial, unvalidated configuration change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub timeout_seconds: Option<i64>,
    pub periodic_seconds: Option<i64>,
    pub time_range_enabled: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub active_days: Option<String>,
    /// Fields whose raw value had the wrong type.
    pub malformed: Vec<FieldRejection>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_seconds(mut self, secs: i64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn periodic_seconds(mut self, secs: i64) -> Self {
        self.periodic_seconds = Some(secs);
        self
    }

    pub fn time_range_enabled(mut self, enabled: bool) -> Self {
        self.time_range_enabled = Some(enabled);
        self
    }

    pub fn start_time(mut self, value: impl Into<String>) -> Self {
        self.start_time = Some(value.into());
        self
    }

    pub fn end_time(mut self, value: impl Into<String>) -> Self {
        self.end_time = Some(value.into());
        self
    }

    pub fn active_days(mut self, value: impl Into<String>) -> Self {
        self.active_days = Some(value.into());
        self
    }

    /// Whether the update carries no fields at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate each field against `current` and build the next snapshot.
    pub fn apply_to(&self, current: &MonitorSettings) -> AppliedUpdate {
        let mut next = *current;
        let mut rejections = self.malformed.clone();

        if let Some(secs) = self.timeout_seconds {
            match positive_secs(secs).and_then(|d| next.monitor.with_timeout(d).ok()) {
                Some(monitor) => next.monitor = monitor,
                None => rejections.push(FieldRejection::new(
                    "timeoutSeconds",
                    secs.to_string(),
                    format!("timeout must be between 1 and {MAX_INTERVAL_SECS} seconds"),
                )),
            }
        }

        if let Some(secs) = self.periodic_seconds {
            let interval = u64::try_from(secs).ok().filter(|s| *s <= MAX_INTERVAL_SECS);
            match interval.and_then(|s| {
                next.monitor
                    .with_periodic_interval(Duration::from_secs(s))
                    .ok()
            }) {
                Some(monitor) => next.monitor = monitor,
                None => rejections.push(FieldRejection::new(
                    "periodicSeconds",
                    secs.to_string(),
                    format!(
                        "periodic interval must be between 0 (off) and {MAX_INTERVAL_SECS} seconds"
                    ),
                )),
            }
        }

        if let Some(enabled) = self.time_range_enabled {
            next.schedule.enabled = enabled;
        }

        if let Some(value) = &self.start_time {
            match parse_time_of_day("startTime", value) {
                Ok(time) => next.schedule.start = time,
                Err(e) => rejections.extend(e.rejections().iter().cloned()),
            }
        }

        if let Some(value) = &self.end_time {
            match parse_time_of_day("endTime", value) {
                Ok(time) => next.schedule.end = time,
                Err(e) => rejections.extend(e.rejections().iter().cloned()),
            }
        }

        if let Some(value) = &self.active_days {
            match parse_active_days(value) {
                Ok(days) => next.schedule.active_days = days,
                Err(e) => rejections.extend(e.rejections().iter().cloned()),
            }
        }

        AppliedUpdate {
            settings: next,
            rejections,
        }
    }
}

fn positive_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| (1..=MAX_INTERVAL_SECS).contains(s))
        .map(Duration::from_secs)
}

/// Outcome of [`ConfigUpdate::apply_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// The complete snapshot to install (valid fields applied).
    pub settings: MonitorSettings,
    /// Fields that kept their previous value.
    pub rejections: Vec<FieldRejection>,
}

impl AppliedUpdate {
    /// Whether every field was accepted.
    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty()
    }

    /// The rejections as an error, if any field was rejected.
    pub fn error(&self) -> Option<WatchError> {
        (!self.rejections.is_empty()).then(|| WatchError::ConfigRejected {
            rejections: self.rejections.clone(),
        })
    }
}
