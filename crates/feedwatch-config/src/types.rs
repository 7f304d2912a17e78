//! Validated monitor and schedule configuration.
//!
//! [`MonitorConfig`] and [`ScheduleConfig`] can only be built from valid
//! values: the timeout is strictly positive, window bounds are real times of
//! day, and weekdays are in 1..=7. The raw persisted strings are parsed with
//! [`parse_time_of_day`] and [`parse_active_days`].

use std::fmt;
use std::time::Duration;

use chrono::{NaiveTime, Timelike, Weekday};
use feedwatch_core::{Result, WatchError};

/// Default no-data timeout (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default periodic re-alert interval (0 = disabled).
pub const DEFAULT_PERIODIC_SECS: u64 = 0;

/// Upper bound for the timeout and the periodic interval (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default window start.
pub const DEFAULT_START_TIME: &str = "09:00";

/// Default window end.
pub const DEFAULT_END_TIME: &str = "17:00";

/// Default active weekdays (Monday to Friday).
pub const DEFAULT_ACTIVE_DAYS: &str = "1,2,3,4,5";

/// Timing thresholds for outage detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    timeout: Duration,
    periodic_interval: Duration,
}

impl MonitorConfig {
    /// Create a config. `timeout` must be non-zero; a zero
    /// `periodic_interval` disables re-alerts. Neither may exceed
    /// [`MAX_INTERVAL_SECS`].
    pub fn new(timeout: Duration, periodic_interval: Duration) -> Result<Self> {
        let max = Duration::from_secs(MAX_INTERVAL_SECS);
        if timeout.is_zero() {
            return Err(WatchError::validation(
                "timeoutSeconds",
                "0",
                "timeout must be greater than zero",
            ));
        }
        if timeout > max {
            return Err(WatchError::validation(
                "timeoutSeconds",
                timeout.as_secs().to_string(),
                format!("timeout cannot exceed {MAX_INTERVAL_SECS} seconds"),
            ));
        }
        if periodic_interval > max {
            return Err(WatchError::validation(
                "periodicSeconds",
                periodic_interval.as_secs().to_string(),
                format!("periodic interval cannot exceed {MAX_INTERVAL_SECS} seconds"),
            ));
        }
        Ok(Self {
            timeout,
            periodic_interval,
        })
    }

    /// Create a config from whole seconds.
    pub fn from_secs(timeout_secs: u64, periodic_secs: u64) -> Result<Self> {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(periodic_secs),
        )
    }

    /// Time without any event before an outage is declared.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Interval between "still down" re-alerts (zero when disabled).
    pub fn periodic_interval(&self) -> Duration {
        self.periodic_interval
    }

    /// Re-alert interval, if periodic alerting is enabled.
    pub fn periodic(&self) -> Option<Duration> {
        (!self.periodic_interval.is_zero()).then_some(self.periodic_interval)
    }

    /// Return a copy with a different timeout.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::new(timeout, self.periodic_interval)
    }

    /// Return a copy with a different periodic interval.
    pub fn with_periodic_interval(self, periodic_interval: Duration) -> Result<Self> {
        Self::new(self.timeout, periodic_interval)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            periodic_interval: Duration::from_secs(DEFAULT_PERIODIC_SECS),
        }
    }
}

/// Set of weekdays on which alerting is allowed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActiveDays(u8);

impl ActiveDays {
    /// No days active.
    pub const NONE: Self = Self(0);

    /// Every day active.
    pub const ALL: Self = Self(0b111_1111);

    /// Monday through Friday.
    pub const WEEKDAYS: Self = Self(0b001_1111);

    /// Build from weekdays.
    pub fn from_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        days.into_iter().fold(Self::NONE, |set, day| set.with(day))
    }

    /// Return a copy with `day` added.
    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | (1 << day.num_days_from_monday()))
    }

    /// Whether `day` is active.
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    /// Whether no day is active.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Active days in Monday-first order.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |day| self.contains(*day))
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl Default for ActiveDays {
    fn default() -> Self {
        Self::WEEKDAYS
    }
}

/// Formats as the persisted comma-separated list, e.g. `1,2,3,4,5`.
impl fmt::Display for ActiveDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self
            .iter()
            .map(|day| day.number_from_monday().to_string())
            .collect();
        write!(f, "{}", numbers.join(","))
    }
}

impl fmt::Debug for ActiveDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Daily time window and weekday filter for alerting.
///
/// Windows do not wrap midnight: when `end < start` the window is empty and
/// alerting is never permitted while the gate is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// When false, alerting is always permitted.
    pub enabled: bool,
    /// Window start, inclusive (minute resolution).
    pub start: NaiveTime,
    /// Window end, inclusive (minute resolution).
    pub end: NaiveTime,
    /// Weekdays on which the window applies.
    pub active_days: ActiveDays,
}

impl ScheduleConfig {
    /// A gate that always permits alerting.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// An enabled window from raw `HH:mm` strings and a weekday set.
    pub fn window(start: &str, end: &str, active_days: ActiveDays) -> Result<Self> {
        Ok(Self {
            enabled: true,
            start: parse_time_of_day("startTime", start)?,
            end: parse_time_of_day("endTime", end)?,
            active_days,
        })
    }

    /// Whether the window wraps past midnight (and therefore never matches).
    pub fn is_inverted(&self) -> bool {
        self.end < self.start
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_start(),
            end: default_end(),
            active_days: ActiveDays::default(),
        }
    }
}

fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// The complete configuration snapshot read by the monitor on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorSettings {
    pub monitor: MonitorConfig,
    pub schedule: ScheduleConfig,
}

impl MonitorSettings {
    pub fn new(monitor: MonitorConfig, schedule: ScheduleConfig) -> Self {
        Self { monitor, schedule }
    }
}

/// Parse a strict 24-hour `HH:mm` time of day.
///
/// Exactly two digits, a colon and two digits; hour 00-23, minute 00-59.
/// `field` names the setting in the returned validation error.
pub fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime> {
    let reject = |reason: &str| WatchError::validation(field, value, reason);

    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 5
        && bytes[2] == b':'
        && [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
    if !well_formed {
        return Err(reject("expected 24-hour HH:mm"));
    }

    let digit = |i: usize| u32::from(bytes[i] - b'0');
    let hour = digit(0) * 10 + digit(1);
    let minute = digit(3) * 10 + digit(4);

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| reject("hour must be 00-23 and minute 00-59"))
}

/// Format a time of day as `HH:mm`.
pub fn format_time_of_day(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// Parse a comma-separated list of ISO weekday numbers (1 = Monday ... 7 = Sunday).
///
/// Whitespace around entries is ignored and duplicates are harmless. An empty
/// list is valid and yields [`ActiveDays::NONE`].
pub fn parse_active_days(value: &str) -> Result<ActiveDays> {
    let mut days = ActiveDays::NONE;
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let weekday = part
            .parse::<u8>()
            .ok()
            .and_then(weekday_from_number)
            .ok_or_else(|| {
                WatchError::validation(
                    "activeDays",
                    value,
                    format!("'{part}' is not a weekday number 1-7"),
                )
            })?;
        days = days.with(weekday);
    }
    Ok(days)
}

/// Map an ISO weekday number (1 = Monday) to a [`Weekday`].
pub fn weekday_from_number(number: u8) -> Option<Weekday> {
    match number {
        1..=7 => Some(WEEK[usize::from(number - 1)]),
        _ => None,
    }
}
