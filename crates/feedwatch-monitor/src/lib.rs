//! # feedwatch-monitor
//!
//! Liveness monitoring for a streaming market-data feed.
//!
//! - [`LivenessTable`] - newest event timestamp per source
//! - [`gate`] - the daily time window and weekday filter for alerts
//! - [`OutageMachine`] - `Idle` / `TimedOut` / `PeriodicAlerting` transitions
//! - [`Monitor`] - the service that drives all of the above from tokio timers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedwatch_config::MonitorSettings;
//! use feedwatch_monitor::Monitor;
//! use feedwatch_notify::LogNotifier;
//!
//! #[tokio::main]
//! async fn main() -> feedwatch_core::Result<()> {
//!     let monitor = Monitor::new(MonitorSettings::default(), Arc::new(LogNotifier::new()));
//!     monitor.start_monitoring()?;
//!
//!     monitor.record_event_now("ESZ4");
//!     println!("{}", monitor.describe_schedule_status());
//!
//!     monitor.shutdown();
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod gate;
pub mod liveness;
pub mod monitor;
pub mod outage;
pub mod timer;

pub use clock::{Clock, SystemClock, TokioClock};
pub use liveness::LivenessTable;
pub use monitor::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_GATE_INTERVAL, Monitor, MonitorOptions, MonitorStatus,
    TEST_MESSAGE,
};
pub use outage::{OutageMachine, OutageState, Transition};
