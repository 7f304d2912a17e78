//! Alert window evaluation.
//!
//! The gate decides whether a notification may be sent at a given local time.
//! It never affects outage detection itself.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use feedwatch_config::{ScheduleConfig, format_time_of_day};

/// Whether alerting is permitted at local time `now`.
///
/// A disabled schedule always permits. Otherwise the weekday must be active
/// and the time of day, truncated to the minute, must lie within
/// `start..=end`. Windows do not wrap midnight, so `end < start` never
/// permits.
pub fn is_alerting_permitted(schedule: &ScheduleConfig, now: NaiveDateTime) -> bool {
    if !schedule.enabled {
        return true;
    }
    if !schedule.active_days.contains(now.weekday()) {
        return false;
    }

    let minute = truncate_to_minute(now.time());
    schedule.start <= minute && minute <= schedule.end
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// One-line, human readable gate status for `now`.
pub fn describe(schedule: &ScheduleConfig, now: NaiveDateTime) -> String {
    if !schedule.enabled {
        return "Time range disabled, alerts always on".to_string();
    }

    let window = format!(
        "{}-{} on {}",
        format_time_of_day(schedule.start),
        format_time_of_day(schedule.end),
        describe_days(schedule)
    );

    if schedule.is_inverted() {
        return format!("Window {window} ends before it starts, alerts never sent");
    }

    if is_alerting_permitted(schedule, now) {
        format!("Inside window {window}, alerts on")
    } else {
        format!("Outside window {window}, alerts paused")
    }
}

fn describe_days(schedule: &ScheduleConfig) -> String {
    if schedule.active_days.is_empty() {
        return "no days".to_string();
    }
    schedule
        .active_days
        .iter()
        .map(|day| day.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
