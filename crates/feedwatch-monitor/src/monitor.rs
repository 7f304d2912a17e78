//! The monitor service.
//!
//! [`Monitor`] wires the liveness table, the alert window gate and the outage
//! state machine to three tokio timers:
//!
//! | Timer    | Cadence                     | Runs while            |
//! |----------|-----------------------------|-----------------------|
//! | check    | every 5 seconds             | monitoring            |
//! | periodic | `periodicInterval`          | an outage is ongoing  |
//! | gate     | every 60 seconds            | monitoring            |
//!
//! All state transitions go through one mutex. Notifications are sent after
//! it is released and race against the owning timer's cancellation token, so
//! nothing is delivered once [`Monitor::stop_monitoring`] has returned.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use feedwatch_config::{ConfigUpdate, MonitorSettings};
use feedwatch_core::{Result, WatchError, log_notification, log_outage_event};
use feedwatch_notify::{Notifier, NotifyError};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::gate;
use crate::liveness::LivenessTable;
use crate::outage::{Observation, OutageMachine, OutageState, PeriodicPlan, Transition};
use crate::timer::{TimerSlot, spawn_every};

/// Default check tick cadence.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default alert window re-evaluation cadence.
pub const DEFAULT_GATE_INTERVAL: Duration = Duration::from_secs(60);

/// Text of the operator test message.
pub const TEST_MESSAGE: &str = "🧪 Test message from feedwatch";

/// Timer cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub check_interval: Duration,
    pub gate_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            gate_interval: DEFAULT_GATE_INTERVAL,
        }
    }
}

/// Point-in-time view of the monitor for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub monitoring: bool,
    pub outage_state: OutageState,
    pub timed_out_at: Option<DateTime<Utc>>,
    pub source_count: usize,
    pub last_event_at: Option<DateTime<Utc>>,
    pub alerting_permitted: bool,
    pub schedule: String,
    pub timeout_secs: u64,
    pub periodic_secs: u64,
    pub notifier: String,
}

/// Feed liveness monitor. Cheap to clone; clones share one instance.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    options: MonitorOptions,
    liveness: LivenessTable,
    settings: ArcSwap<MonitorSettings>,
    core: Mutex<Core>,
    /// Mirrors `core.machine.state().is_outage()` for the lock-free event path.
    in_outage: AtomicBool,
    gate_tx: watch::Sender<bool>,
}

/// Everything a transition touches.
#[derive(Default)]
struct Core {
    machine: OutageMachine,
    check: TimerSlot,
    periodic: TimerSlot,
    gate: TimerSlot,
}

impl Monitor {
    /// Create a monitor on the system clock with default cadences.
    pub fn new(settings: MonitorSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_clock(
            settings,
            notifier,
            Arc::new(SystemClock),
            MonitorOptions::default(),
        )
    }

    /// Create a monitor with an explicit clock and cadences.
    pub fn with_clock(
        settings: MonitorSettings,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
    ) -> Self {
        let permitted = gate::is_alerting_permitted(&settings.schedule, clock.local_now());
        let (gate_tx, _) = watch::channel(permitted);

        Self {
            inner: Arc::new(Inner {
                clock,
                notifier,
                options,
                liveness: LivenessTable::new(),
                settings: ArcSwap::from_pointee(settings),
                core: Mutex::new(Core::default()),
                in_outage: AtomicBool::new(false),
                gate_tx,
            }),
        }
    }

    // =========================================================================
    // Event ingestion
    // =========================================================================

    /// Record a data event for `source`.
    ///
    /// Never blocks on the state machine unless an outage is in progress and
    /// this event may end it.
    pub fn record_event(&self, source: &str, timestamp: DateTime<Utc>) {
        self.inner.liveness.record(source, timestamp);
        if self.inner.in_outage.load(Ordering::SeqCst) {
            self.inner.signal_data();
        }
    }

    /// Record a data event for `source` at the current time.
    pub fn record_event_now(&self, source: &str) {
        self.record_event(source, self.inner.clock.now());
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Start monitoring. Returns false if it was already started.
    ///
    /// Must be called from within a tokio runtime. The first check runs one
    /// check interval later.
    pub fn start_monitoring(&self) -> Result<bool> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::internal(format!("Monitoring needs a tokio runtime: {e}")))?;

        {
            let mut core = self.inner.lock_core();
            if !core.machine.start() {
                debug!("Monitoring already started");
                return Ok(false);
            }
            self.inner.in_outage.store(false, Ordering::SeqCst);

            let token = core.check.arm();
            self.inner
                .spawn_timer(self.inner.options.check_interval, token, Inner::check_tick);
            let token = core.gate.arm();
            self.inner
                .spawn_timer(self.inner.options.gate_interval, token, Inner::gate_tick);
        }

        self.inner.evaluate_gate();

        let settings = self.inner.snapshot();
        info!(
            timeout_secs = settings.monitor.timeout().as_secs(),
            periodic_secs = settings.monitor.periodic_interval().as_secs(),
            sources = self.inner.liveness.len(),
            "Monitoring started"
        );
        Ok(true)
    }

    /// Stop monitoring, cancel every timer and return to `Idle`.
    ///
    /// Returns false if monitoring was not running.
    pub fn stop_monitoring(&self) -> bool {
        let was_monitoring = {
            let mut core = self.inner.lock_core();
            core.check.cancel();
            core.periodic.cancel();
            core.gate.cancel();
            self.inner.in_outage.store(false, Ordering::SeqCst);
            core.machine.stop()
        };

        if was_monitoring {
            info!("Monitoring stopped");
        } else {
            debug!("Monitoring already stopped");
        }
        was_monitoring
    }

    /// Stop monitoring before the process exits.
    pub fn shutdown(&self) {
        self.stop_monitoring();
        info!(sources = self.inner.liveness.len(), "Monitor shut down");
    }

    /// Replace the whole configuration with an already validated snapshot.
    pub fn apply_config(&self, settings: MonitorSettings) {
        {
            let mut core = self.inner.lock_core();
            self.inner.install(&mut core, settings);
        }
        self.inner.evaluate_gate();
        log_applied(&settings);
    }

    /// Validate and apply a partial update.
    ///
    /// Valid fields take effect even when others are rejected; rejected
    /// fields keep their previous value and are returned as
    /// [`WatchError::ConfigRejected`].
    pub fn apply_update(&self, update: &ConfigUpdate) -> Result<()> {
        let applied = {
            let mut core = self.inner.lock_core();
            let applied = update.apply_to(&self.inner.snapshot());
            self.inner.install(&mut core, applied.settings);
            applied
        };
        self.inner.evaluate_gate();
        log_applied(&applied.settings);

        for rejection in &applied.rejections {
            warn!(%rejection, "Config field rejected, previous value kept");
        }
        applied.error().map_or(Ok(()), Err)
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock_core().machine.is_monitoring()
    }

    pub fn current_outage_state(&self) -> OutageState {
        self.inner.lock_core().machine.state()
    }

    /// Whether the alert window permits sending right now.
    pub fn is_alerting_permitted_now(&self) -> bool {
        gate::is_alerting_permitted(&self.inner.snapshot().schedule, self.inner.clock.local_now())
    }

    /// Human readable alert window status.
    pub fn describe_schedule_status(&self) -> String {
        gate::describe(&self.inner.snapshot().schedule, self.inner.clock.local_now())
    }

    /// The configuration snapshot currently in effect.
    pub fn settings(&self) -> MonitorSettings {
        self.inner.snapshot()
    }

    /// Number of sources seen since startup.
    pub fn source_count(&self) -> usize {
        self.inner.liveness.len()
    }

    /// Newest event timestamp recorded for `source`.
    pub fn last_seen(&self, source: &str) -> Option<DateTime<Utc>> {
        self.inner.liveness.last_seen(source)
    }

    /// Watch alert window edges. The value is true while alerting is permitted.
    pub fn subscribe_gate(&self) -> watch::Receiver<bool> {
        self.inner.gate_tx.subscribe()
    }

    pub fn status(&self) -> MonitorStatus {
        let settings = self.inner.snapshot();
        let local_now = self.inner.clock.local_now();
        let (monitoring, outage_state, timed_out_at) = {
            let core = self.inner.lock_core();
            (
                core.machine.is_monitoring(),
                core.machine.state(),
                core.machine.timed_out_at(),
            )
        };

        MonitorStatus {
            monitoring,
            outage_state,
            timed_out_at,
            source_count: self.inner.liveness.len(),
            last_event_at: self.inner.liveness.latest(),
            alerting_permitted: gate::is_alerting_permitted(&settings.schedule, local_now),
            schedule: gate::describe(&settings.schedule, local_now),
            timeout_secs: settings.monitor.timeout().as_secs(),
            periodic_secs: settings.monitor.periodic_interval().as_secs(),
            notifier: self.inner.notifier.name().to_string(),
        }
    }

    // =========================================================================
    // Operator messages
    // =========================================================================

    /// Send the test message. Ignores the alert window and the outage state.
    pub async fn send_test_message(&self) -> feedwatch_notify::Result<()> {
        self.send_message(TEST_MESSAGE).await
    }

    /// Send an operator message. Ignores the alert window and the outage state.
    pub async fn send_message(&self, message: &str) -> feedwatch_notify::Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Err(NotifyError::InvalidMessage("message is empty".to_string()));
        }

        let notifier = self.inner.notifier.name();
        let result = self.inner.notifier.send(message).await;
        match &result {
            Ok(()) => log_notification!(notifier, kind = "operator", success = true),
            Err(e) => log_notification!(notifier, kind = "operator", success = false, error = %e),
        }
        result
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("notifier", &self.inner.notifier.name())
            .field("settings", &self.inner.snapshot())
            .field("sources", &self.inner.liveness.len())
            .finish_non_exhaustive()
    }
}

fn log_applied(settings: &MonitorSettings) {
    info!(
        timeout_secs = settings.monitor.timeout().as_secs(),
        periodic_secs = settings.monitor.periodic_interval().as_secs(),
        time_range = settings.schedule.enabled,
        "Configuration applied"
    );
}

impl Inner {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> MonitorSettings {
        **self.settings.load()
    }

    fn observe(&self, settings: &MonitorSettings) -> Observation {
        let now = self.clock.now();
        Observation {
            now,
            has_sources: !self.liveness.is_empty(),
            live: self
                .liveness
                .has_live_source(now, settings.monitor.timeout()),
            permitted: gate::is_alerting_permitted(&settings.schedule, self.clock.local_now()),
        }
    }

    /// Spawn a timer task that holds only a weak reference to the monitor.
    fn spawn_timer<F, Fut>(self: &Arc<Self>, period: Duration, token: CancellationToken, on_tick: F)
    where
        F: Fn(Arc<Inner>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        let tick_token = token.clone();
        spawn_every(period, token, move || {
            let tick = weak.upgrade().map(|inner| on_tick(inner, tick_token.clone()));
            async move {
                match tick {
                    Some(tick) => {
                        tick.await;
                        std::ops::ControlFlow::Continue(())
                    }
                    None => std::ops::ControlFlow::Break(()),
                }
            }
        });
    }

    async fn check_tick(self: Arc<Self>, token: CancellationToken) {
        let alert = {
            let mut core = self.lock_core();
            if token.is_cancelled() {
                return;
            }
            let settings = self.snapshot();
            let transition = core.machine.check(self.observe(&settings), &settings.monitor);
            self.handle(&mut core, transition, &settings)
        };

        if let Some(message) = alert {
            self.deliver(&message, &token).await;
        }
    }

    async fn periodic_tick(self: Arc<Self>, token: CancellationToken) {
        let alert = {
            let mut core = self.lock_core();
            if token.is_cancelled() {
                return;
            }
            let settings = self.snapshot();
            let transition = core
                .machine
                .periodic_fire(self.observe(&settings), &settings.monitor);
            self.handle(&mut core, transition, &settings)
        };

        if let Some(message) = alert {
            self.deliver(&message, &token).await;
        }
    }

    async fn gate_tick(self: Arc<Self>, _token: CancellationToken) {
        self.evaluate_gate();
    }

    /// Data arrived during an outage; recover if the feed is live again.
    fn signal_data(self: &Arc<Self>) {
        let settings = self.snapshot();
        let now = self.clock.now();
        if !self.liveness.has_live_source(now, settings.monitor.timeout()) {
            return;
        }

        let mut core = self.lock_core();
        let transition = core.machine.data_returned(now);
        self.handle(&mut core, transition, &settings);
    }

    /// Apply a transition's timer side effects and return the alert to send.
    fn handle(
        self: &Arc<Self>,
        core: &mut Core,
        transition: Transition,
        settings: &MonitorSettings,
    ) -> Option<String> {
        match transition {
            Transition::Unchanged => None,
            Transition::Onset { alert, periodic } => {
                self.in_outage.store(true, Ordering::SeqCst);
                log_outage_event!(
                    "onset",
                    timeout_secs = settings.monitor.timeout().as_secs(),
                    alert = alert.is_some()
                );
                if alert.is_none() {
                    info!("Outside the alert window, onset alert suppressed");
                }
                if let Some(interval) = periodic {
                    self.arm_periodic(core, interval);
                }
                alert
            }
            Transition::StillDown { cumulative, alert } => {
                log_outage_event!(
                    "still_down",
                    cumulative_secs = cumulative.as_secs(),
                    alert = alert.is_some()
                );
                alert
            }
            Transition::Recovered { downtime } => {
                core.periodic.cancel();
                self.in_outage.store(false, Ordering::SeqCst);
                log_outage_event!("recovered", downtime_secs = downtime.as_secs());
                None
            }
        }
    }

    fn arm_periodic(self: &Arc<Self>, core: &mut Core, interval: Duration) {
        let token = core.periodic.arm();
        self.spawn_timer(interval, token, Inner::periodic_tick);
        debug!(interval_secs = interval.as_secs(), "Periodic re-alert armed");
    }

    /// Store a new snapshot and line the periodic timer up with it.
    fn install(self: &Arc<Self>, core: &mut Core, settings: MonitorSettings) {
        self.settings.store(Arc::new(settings));
        match core.machine.reconcile(&settings.monitor) {
            Some(PeriodicPlan::Arm(interval)) => self.arm_periodic(core, interval),
            Some(PeriodicPlan::Cancel) => {
                core.periodic.cancel();
                debug!("Periodic re-alert cancelled");
            }
            None => {}
        }
    }

    /// Re-evaluate the gate and publish an edge if it changed.
    fn evaluate_gate(&self) -> bool {
        let schedule = self.snapshot().schedule;
        let local_now = self.clock.local_now();
        let permitted = gate::is_alerting_permitted(&schedule, local_now);

        let changed = self.gate_tx.send_if_modified(|current| {
            let changed = *current != permitted;
            *current = permitted;
            changed
        });

        if changed {
            let status = gate::describe(&schedule, local_now);
            if permitted {
                info!(%status, "Alert window opened");
            } else {
                info!(%status, "Alert window closed");
            }
        }
        permitted
    }

    async fn deliver(&self, message: &str, token: &CancellationToken) {
        let notifier = self.notifier.name();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(notifier, "Timer cancelled, notification abandoned");
            }
            result = self.notifier.send(message) => {
                match result {
                    Ok(()) => log_notification!(notifier, kind = "alert", success = true),
                    Err(e) => {
                        log_notification!(notifier, kind = "alert", success = false, error = %e);
                        warn!(notifier, error = %e, action = e.suggested_action(), "Alert delivery failed");
                    }
                }
            }
        }
    }
}
