//! The outage state machine.
//!
//! ```text
//!            check: sources known, none live
//!   Idle ──────────────────────────────────────► TimedOut ──(periodic > 0)──► PeriodicAlerting
//!    ▲                                              │                              │
//!    └──────────── data returned / stop ◄───────────┴──────────────────────────────┘
//! ```
//!
//! [`OutageMachine`] holds no timers and performs no I/O. Each input returns a
//! [`Transition`] telling the caller which alert to send and which timer to
//! arm or cancel. The gate decision is an input: when alerting is not
//! permitted the bookkeeping still happens but the transition carries no
//! alert.

use std::time::Duration;

use chrono::{DateTime, Utc};
use feedwatch_config::MonitorConfig;
use serde::{Deserialize, Serialize};

/// Slack allowed for a periodic fire that lands a hair before a full
/// interval has elapsed on the wall clock.
const TIMER_JITTER: Duration = Duration::from_millis(250);

/// Outage state, process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutageState {
    /// Data is flowing, or monitoring is stopped.
    #[default]
    Idle,
    /// Outage detected, no re-alerts scheduled.
    TimedOut,
    /// Outage detected, re-alerting on an interval.
    PeriodicAlerting,
}

impl OutageState {
    /// Returns true while an outage is in progress.
    pub fn is_outage(&self) -> bool {
        matches!(self, Self::TimedOut | Self::PeriodicAlerting)
    }

    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::TimedOut => "Timed out",
            Self::PeriodicAlerting => "Periodic alerting",
        }
    }
}

impl std::fmt::Display for OutageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What a single evaluation of the feed looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub now: DateTime<Utc>,
    /// At least one source has ever reported.
    pub has_sources: bool,
    /// At least one source reported within the timeout.
    pub live: bool,
    /// The alert window permits sending.
    pub permitted: bool,
}

/// Result of feeding an input to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do.
    Unchanged,
    /// An outage began. Arm the periodic timer when `periodic` is set.
    Onset {
        alert: Option<String>,
        periodic: Option<Duration>,
    },
    /// The outage continues; `cumulative` is the downtime to report.
    StillDown {
        cumulative: Duration,
        alert: Option<String>,
    },
    /// Data returned. Cancel the periodic timer; nothing is sent.
    Recovered { downtime: Duration },
}

/// Change to the periodic timer after a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicPlan {
    /// (Re)arm at this interval, first fire one interval from now.
    Arm(Duration),
    /// Cancel the armed timer.
    Cancel,
}

/// Outage bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct OutageMachine {
    monitoring: bool,
    state: OutageState,
    timed_out_at: Option<DateTime<Utc>>,
    periodic: Option<Duration>,
}

impl OutageMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OutageState {
        self.state
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// When the current outage was detected.
    pub fn timed_out_at(&self) -> Option<DateTime<Utc>> {
        self.timed_out_at
    }

    /// Interval the periodic timer is armed at, if any.
    pub fn periodic_interval(&self) -> Option<Duration> {
        self.periodic
    }

    /// Start monitoring. Returns false if already started.
    pub fn start(&mut self) -> bool {
        if self.monitoring {
            return false;
        }
        self.monitoring = true;
        self.reset();
        true
    }

    /// Stop monitoring and return to `Idle`. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        let was_monitoring = self.monitoring;
        self.monitoring = false;
        self.reset();
        was_monitoring
    }

    fn reset(&mut self) {
        self.state = OutageState::Idle;
        self.timed_out_at = None;
        self.periodic = None;
    }

    /// Handle a check tick.
    pub fn check(&mut self, obs: Observation, config: &MonitorConfig) -> Transition {
        if !self.monitoring {
            return Transition::Unchanged;
        }

        match self.state {
            OutageState::Idle if obs.has_sources && !obs.live => {
                self.timed_out_at = Some(obs.now);
                self.periodic = config.periodic();
                self.state = match self.periodic {
                    Some(_) => OutageState::PeriodicAlerting,
                    None => OutageState::TimedOut,
                };
                Transition::Onset {
                    alert: obs.permitted.then(|| no_connection_message(config.timeout())),
                    periodic: self.periodic,
                }
            }
            // A data event that raced with onset detection is picked up here
            state if state.is_outage() && obs.live => self.recover(obs.now),
            _ => Transition::Unchanged,
        }
    }

    /// Handle a fire of the periodic re-alert timer.
    pub fn periodic_fire(&mut self, obs: Observation, config: &MonitorConfig) -> Transition {
        if !self.monitoring || self.state != OutageState::PeriodicAlerting {
            return Transition::Unchanged;
        }
        if obs.live {
            return self.recover(obs.now);
        }

        let (Some(timed_out_at), Some(interval)) = (self.timed_out_at, config.periodic()) else {
            return Transition::Unchanged;
        };

        let cumulative = cumulative_downtime(config.timeout(), interval, timed_out_at, obs.now);
        Transition::StillDown {
            cumulative,
            alert: obs.permitted.then(|| no_connection_message(cumulative)),
        }
    }

    /// Handle a data event that made at least one source live again.
    pub fn data_returned(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.state.is_outage() {
            return Transition::Unchanged;
        }
        self.recover(now)
    }

    fn recover(&mut self, now: DateTime<Utc>) -> Transition {
        let downtime = self
            .timed_out_at
            .and_then(|at| (now - at).to_std().ok())
            .unwrap_or_default();
        self.reset();
        Transition::Recovered { downtime }
    }

    /// Bring the periodic schedule in line with a new configuration.
    pub fn reconcile(&mut self, config: &MonitorConfig) -> Option<PeriodicPlan> {
        if !self.monitoring || !self.state.is_outage() || self.periodic == config.periodic() {
            return None;
        }

        self.periodic = config.periodic();
        match self.periodic {
            Some(interval) => {
                self.state = OutageState::PeriodicAlerting;
                Some(PeriodicPlan::Arm(interval))
            }
            None => {
                self.state = OutageState::TimedOut;
                Some(PeriodicPlan::Cancel)
            }
        }
    }
}

/// `timeout + k * interval`, where `k` is the number of whole intervals
/// since the outage was detected.
///
/// `k` is counted with 250 ms of timer jitter slack (at most a quarter of the
/// interval), so a periodic fire landing just short of `k` full intervals on
/// the wall clock still reports `k`.
pub fn cumulative_downtime(
    timeout: Duration,
    interval: Duration,
    timed_out_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Duration {
    let elapsed = (now - timed_out_at).to_std().unwrap_or_default();
    let slack = TIMER_JITTER.min(interval / 4);
    let intervals = (elapsed + slack).as_millis() / interval.as_millis().max(1);
    let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
    timeout.saturating_add(interval.saturating_mul(intervals))
}

/// The alert text for `downtime` without data.
pub fn no_connection_message(downtime: Duration) -> String {
    format!("⚠️ No connection after {} seconds", downtime.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn down(secs: i64) -> Observation {
        Observation {
            now: at(secs),
            has_sources: true,
            live: false,
            permitted: true,
        }
    }

    fn up(secs: i64) -> Observation {
        Observation {
            live: true,
            ..down(secs)
        }
    }

    fn config(timeout: u64, periodic: u64) -> MonitorConfig {
        MonitorConfig::from_secs(timeout, periodic).unwrap()
    }

    fn started() -> OutageMachine {
        let mut machine = OutageMachine::new();
        assert!(machine.start());
        machine
    }

    #[test]
    fn test_no_onset_without_monitoring() {
        let mut machine = OutageMachine::new();
        assert_eq!(machine.check(down(60), &config(30, 0)), Transition::Unchanged);
        assert_eq!(machine.state(), OutageState::Idle);
    }

    #[test]
    fn test_no_onset_without_sources() {
        let mut machine = started();
        let obs = Observation {
            has_sources: false,
            ..down(60)
        };
        assert_eq!(machine.check(obs, &config(30, 0)), Transition::Unchanged);
        assert_eq!(machine.state(), OutageState::Idle);
    }

    #[test]
    fn test_onset_fires_once() {
        let mut machine = started();
        let cfg = config(30, 0);

        assert_eq!(
            machine.check(down(30), &cfg),
            Transition::Onset {
                alert: Some("⚠️ No connection after 30 seconds".to_string()),
                periodic: None,
            }
        );
        assert_eq!(machine.state(), OutageState::TimedOut);
        assert_eq!(machine.timed_out_at(), Some(at(30)));

        assert_eq!(machine.check(down(35), &cfg), Transition::Unchanged);
        assert_eq!(machine.check(down(40), &cfg), Transition::Unchanged);
    }

    #[test]
    fn test_onset_with_periodic() {
        let mut machine = started();
        let transition = machine.check(down(30), &config(30, 60));
        assert_eq!(
            transition,
            Transition::Onset {
                alert: Some("⚠️ No connection after 30 seconds".to_string()),
                periodic: Some(Duration::from_secs(60)),
            }
        );
        assert_eq!(machine.state(), OutageState::PeriodicAlerting);
        assert_eq!(machine.periodic_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_gate_denied_onset_keeps_bookkeeping() {
        let mut machine = started();
        let obs = Observation {
            permitted: false,
            ..down(30)
        };
        let transition = machine.check(obs, &config(30, 0));
        assert_eq!(
            transition,
            Transition::Onset {
                alert: None,
                periodic: None
            }
        );
        assert_eq!(machine.state(), OutageState::TimedOut);
    }

    #[test]
    fn test_periodic_reports_cumulative_downtime() {
        let mut machine = started();
        let cfg = config(30, 60);
        machine.check(down(30), &cfg);

        assert_eq!(
            machine.periodic_fire(down(90), &cfg),
            Transition::StillDown {
                cumulative: Duration::from_secs(90),
                alert: Some("⚠️ No connection after 90 seconds".to_string()),
            }
        );
        assert_eq!(
            machine.periodic_fire(down(150), &cfg),
            Transition::StillDown {
                cumulative: Duration::from_secs(150),
                alert: Some("⚠️ No connection after 150 seconds".to_string()),
            }
        );
    }

    #[test]
    fn test_periodic_counts_from_true_onset_when_gate_opens_late() {
        let mut machine = started();
        let cfg = config(30, 60);
        let closed = |secs| Observation {
            permitted: false,
            ..down(secs)
        };

        assert!(matches!(
            machine.check(closed(30), &cfg),
            Transition::Onset { alert: None, .. }
        ));
        assert!(matches!(
            machine.periodic_fire(closed(90), &cfg),
            Transition::StillDown { alert: None, .. }
        ));
        assert_eq!(
            machine.periodic_fire(down(150), &cfg),
            Transition::StillDown {
                cumulative: Duration::from_secs(150),
                alert: Some("⚠️ No connection after 150 seconds".to_string()),
            }
        );
    }

    #[test]
    fn test_periodic_fire_recovers_when_data_returned() {
        let mut machine = started();
        let cfg = config(30, 60);
        machine.check(down(30), &cfg);

        assert_eq!(
            machine.periodic_fire(up(90), &cfg),
            Transition::Recovered {
                downtime: Duration::from_secs(60)
            }
        );
        assert_eq!(machine.state(), OutageState::Idle);
        assert_eq!(machine.timed_out_at(), None);
    }

    #[test]
    fn test_data_returned_recovers_silently() {
        let mut machine = started();
        machine.check(down(30), &config(30, 60));

        assert_eq!(
            machine.data_returned(at(45)),
            Transition::Recovered {
                downtime: Duration::from_secs(15)
            }
        );
        assert_eq!(machine.state(), OutageState::Idle);
        assert_eq!(machine.periodic_interval(), None);

        assert_eq!(machine.data_returned(at(50)), Transition::Unchanged);
    }

    #[test]
    fn test_check_recovers_missed_data_signal() {
        let mut machine = started();
        let cfg = config(30, 0);
        machine.check(down(30), &cfg);
        assert!(matches!(machine.check(up(35), &cfg), Transition::Recovered { .. }));
        assert_eq!(machine.state(), OutageState::Idle);
    }

    #[test]
    fn test_stale_periodic_fire_ignored() {
        let mut machine = started();
        let cfg = config(30, 60);
        assert_eq!(machine.periodic_fire(down(90), &cfg), Transition::Unchanged);

        machine.check(down(30), &config(30, 0));
        assert_eq!(machine.periodic_fire(down(90), &cfg), Transition::Unchanged);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut machine = started();
        machine.check(down(30), &config(30, 60));

        assert!(machine.stop());
        assert_eq!(machine.state(), OutageState::Idle);
        assert_eq!(machine.timed_out_at(), None);

        assert!(!machine.stop());
        assert_eq!(machine.state(), OutageState::Idle);
        assert!(!machine.is_monitoring());
    }

    #[test]
    fn test_start_is_guarded() {
        let mut machine = started();
        assert!(!machine.start());
        assert!(machine.is_monitoring());
    }

    #[test]
    fn test_reconcile_periodic_changes() {
        let mut machine = started();
        assert_eq!(machine.reconcile(&config(30, 60)), None);

        machine.check(down(30), &config(30, 0));
        assert_eq!(machine.state(), OutageState::TimedOut);

        assert_eq!(
            machine.reconcile(&config(30, 60)),
            Some(PeriodicPlan::Arm(Duration::from_secs(60)))
        );
        assert_eq!(machine.state(), OutageState::PeriodicAlerting);
        assert_eq!(machine.reconcile(&config(30, 60)), None);

        assert_eq!(
            machine.reconcile(&config(30, 120)),
            Some(PeriodicPlan::Arm(Duration::from_secs(120)))
        );

        assert_eq!(machine.reconcile(&config(30, 0)), Some(PeriodicPlan::Cancel));
        assert_eq!(machine.state(), OutageState::TimedOut);
    }

    #[test]
    fn test_cumulative_downtime_floors_and_tolerates_jitter() {
        let timeout = Duration::from_secs(30);
        let interval = Duration::from_secs(60);
        let t0 = at(0);

        assert_eq!(cumulative_downtime(timeout, interval, t0, at(59)), timeout);
        assert_eq!(
            cumulative_downtime(timeout, interval, t0, at(60)),
            Duration::from_secs(90)
        );
        assert_eq!(
            cumulative_downtime(timeout, interval, t0, at(179)),
            Duration::from_secs(150)
        );

        let early = t0 + TimeDelta::milliseconds(59_900);
        assert_eq!(
            cumulative_downtime(timeout, interval, t0, early),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(OutageState::Idle.to_string(), "Idle");
        assert_eq!(OutageState::PeriodicAlerting.label(), "Periodic alerting");
        assert!(OutageState::TimedOut.is_outage());
        assert!(!OutageState::Idle.is_outage());
    }
}
