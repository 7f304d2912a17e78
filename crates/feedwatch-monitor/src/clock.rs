//! Time sources.
//!
//! The monitor needs two readings of "now": a UTC timestamp for liveness and
//! outage bookkeeping, and a local wall-clock time for the alert window.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// A source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current local date and time, used by the alert window.
    fn local_now(&self) -> NaiveDateTime;
}

/// The system wall clock in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that follows tokio time from a fixed starting point.
///
/// With a paused runtime (`#[tokio::test(start_paused = true)]`) the reading
/// advances exactly as timers do, so timestamps and timer deadlines agree.
/// The local reading is the UTC reading without an offset.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    /// Start the clock at `anchor`.
    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.anchor
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }
}
