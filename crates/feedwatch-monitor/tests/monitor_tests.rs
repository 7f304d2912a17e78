//! End-to-end tests for the monitor service.
//!
//! Every test runs on a paused tokio clock: `sleep_until` advances time and
//! the monitor's timers fire in order, so timelines are exact. Checkpoints
//! sit half a second after the events they observe.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use feedwatch_config::{
    ActiveDays, ConfigUpdate, MonitorConfig, MonitorSettings, ScheduleConfig, Settings,
};
use feedwatch_core::WatchError;
use feedwatch_monitor::{Monitor, MonitorOptions, OutageState, TokioClock};
use feedwatch_notify::MockNotifier;
use tokio::time::{Instant, sleep_until};

/// Monday 2024-01-01, midday.
fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn settings(timeout: u64, periodic: u64) -> MonitorSettings {
    MonitorSettings::new(
        MonitorConfig::from_secs(timeout, periodic).unwrap(),
        ScheduleConfig::disabled(),
    )
}

struct Harness {
    monitor: Monitor,
    notifier: MockNotifier,
    start: Instant,
    anchor: DateTime<Utc>,
}

impl Harness {
    fn new(settings: MonitorSettings) -> Self {
        Self::with(settings, MockNotifier::new(), midday())
    }

    fn with(settings: MonitorSettings, notifier: MockNotifier, anchor: DateTime<Utc>) -> Self {
        let monitor = Monitor::with_clock(
            settings,
            Arc::new(notifier.clone()),
            Arc::new(TokioClock::starting_at(anchor)),
            MonitorOptions::default(),
        );
        Self {
            monitor,
            notifier,
            start: Instant::now(),
            anchor,
        }
    }

    /// Sleep until `millis` after the start of the test.
    async fn at(&self, millis: u64) {
        sleep_until(self.start + Duration::from_millis(millis)).await;
    }

    fn wall(&self, secs: i64) -> DateTime<Utc> {
        self.anchor + TimeDelta::seconds(secs)
    }
}

fn alert(secs: u64) -> String {
    format!("⚠️ No connection after {secs} seconds")
}

mod onset {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_no_alert_when_never_started() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");

        h.at(120_500).await;
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
        assert!(!h.monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_alert_before_any_data() {
        let h = Harness::new(settings(30, 0));
        h.monitor.start_monitoring().unwrap();

        h.at(300_500).await;
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_onset_alert() {
        let h = Harness::new(settings(30, 0));
        h.monitor.start_monitoring().unwrap();

        h.at(1_000).await;
        h.monitor.record_event_now("ES");

        // The tick at 30s still sees the event from 1s as live
        h.at(30_500).await;
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);

        h.at(35_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30)]);
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);
        assert_eq!(h.monitor.status().timed_out_at, Some(h.wall(35)));

        h.at(300_500).await;
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_is_not_retried() {
        let h = Harness::with(settings(30, 0), MockNotifier::failing(), midday());
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(100_500).await;
        assert_eq!(h.notifier.attempts(), vec![alert(30)]);
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_detects_outage_again() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        assert_eq!(h.notifier.count(), 1);

        assert!(h.monitor.stop_monitoring());
        h.at(100_000).await;
        assert!(h.monitor.start_monitoring().unwrap());

        h.at(105_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30), alert(30)]);
    }
}

mod periodic {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_realerts_every_interval_with_cumulative_seconds() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30)]);
        assert_eq!(
            h.monitor.current_outage_state(),
            OutageState::PeriodicAlerting
        );

        // Nothing more until one full interval after onset
        h.at(89_500).await;
        assert_eq!(h.notifier.count(), 1);

        h.at(150_500).await;
        assert_eq!(
            h.notifier.messages(),
            vec![alert(30), alert(90), alert(150)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabling_periodic_mid_outage() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(40_000).await;
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);
        h.monitor
            .apply_update(&ConfigUpdate::new().periodic_seconds(60))
            .unwrap();
        assert_eq!(
            h.monitor.current_outage_state(),
            OutageState::PeriodicAlerting
        );

        // Armed at 40s, first fire at 100s, 70s after onset
        h.at(100_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30), alert(90)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_periodic_mid_outage() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(40_000).await;
        h.monitor
            .apply_update(&ConfigUpdate::new().periodic_seconds(0))
            .unwrap();
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);

        h.at(300_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30)]);
    }
}

mod recovery {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_data_ends_outage_silently() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        assert_eq!(h.notifier.count(), 1);

        h.at(40_000).await;
        h.monitor.record_event_now("NQ");
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
        assert_eq!(h.monitor.status().timed_out_at, None);

        // Keep the feed alive past the point where a re-alert would have fired
        for second in (50..=200).step_by(10) {
            h.at(second * 1_000).await;
            h.monitor.record_event_now("NQ");
        }
        assert_eq!(h.notifier.messages(), vec![alert(30)]);
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_event_does_not_recover() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(40_000).await;
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);

        // Delivered late, stamped 5s after start
        h.monitor.record_event("ES", h.wall(5));
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);
        assert_eq!(h.monitor.last_seen("ES"), Some(h.wall(5)));

        h.monitor.record_event("ES", h.wall(39));
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_outage_after_recovery_alerts_again() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(40_000).await;
        h.monitor.record_event_now("ES");

        // Live until 70s, detected by the tick at 70s
        h.at(70_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30), alert(30)]);
    }
}

mod stop {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_stop_twice_is_noop() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        assert!(h.monitor.stop_monitoring());
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);

        assert!(!h.monitor.stop_monitoring());
        assert_eq!(h.monitor.current_outage_state(), OutageState::Idle);
        assert!(!h.monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_alert_after_stop() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(31_000).await;
        h.monitor.stop_monitoring();

        h.at(600_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_inflight_delivery() {
        let notifier = MockNotifier::new().with_delay(Duration::from_secs(10));
        let h = Harness::with(settings(30, 0), notifier, midday());
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        // Delivery started at 30s and would complete at 40s
        h.at(35_000).await;
        assert_eq!(h.notifier.attempts().len(), 1);
        h.monitor.shutdown();

        h.at(60_500).await;
        assert_eq!(h.notifier.count(), 0);
    }
}

mod schedule {
    use super::*;

    fn office_hours(timeout: u64, periodic: u64) -> MonitorSettings {
        MonitorSettings::new(
            MonitorConfig::from_secs(timeout, periodic).unwrap(),
            ScheduleConfig::window("09:00", "17:00", ActiveDays::WEEKDAYS).unwrap(),
        )
    }

    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_onset_then_periodic_counts_from_true_onset() {
        let h = Harness::with(office_hours(30, 60), MockNotifier::new(), monday(8, 58));
        assert!(!h.monitor.is_alerting_permitted_now());

        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        // Onset at 08:58:30 is suppressed, state still tracks the outage
        h.at(30_500).await;
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(
            h.monitor.current_outage_state(),
            OutageState::PeriodicAlerting
        );

        // 08:59:30, still outside the window
        h.at(90_500).await;
        assert_eq!(h.notifier.count(), 0);

        // 09:00:30, window open
        h.at(150_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(150)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_edges_are_published() {
        let h = Harness::with(office_hours(30, 0), MockNotifier::new(), monday(8, 59));
        let mut rx = h.monitor.subscribe_gate();
        assert!(!*rx.borrow_and_update());

        h.monitor.start_monitoring().unwrap();

        // Gate re-evaluated at 09:00:00
        h.at(60_500).await;
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(h.monitor.is_alerting_permitted_now());
        assert!(h.monitor.describe_schedule_status().starts_with("Inside window"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_reevaluates_gate_immediately() {
        let h = Harness::new(office_hours(30, 0));
        let mut rx = h.monitor.subscribe_gate();
        assert!(*rx.borrow_and_update());

        h.monitor
            .apply_update(&ConfigUpdate::new().active_days("6,7"))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!h.monitor.is_alerting_permitted_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_day_suppresses_onset() {
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();
        let h = Harness::with(office_hours(30, 0), MockNotifier::new(), saturday);
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(60_500).await;
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.monitor.current_outage_state(), OutageState::TimedOut);
        assert!(
            h.monitor
                .describe_schedule_status()
                .starts_with("Outside window")
        );
    }
}

mod config {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_invalid_time_keeps_previous_window() {
        let h = Harness::new(settings(30, 0));
        h.monitor
            .apply_update(
                &ConfigUpdate::new()
                    .time_range_enabled(true)
                    .start_time("10:00")
                    .end_time("12:00"),
            )
            .unwrap();

        let err = h
            .monitor
            .apply_update(&ConfigUpdate::new().start_time("25:99").timeout_seconds(45))
            .unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(err.rejections()[0].field, "startTime");

        let current = h.monitor.settings();
        assert_eq!(
            feedwatch_config::format_time_of_day(current.schedule.start),
            "10:00"
        );
        assert_eq!(
            feedwatch_config::format_time_of_day(current.schedule.end),
            "12:00"
        );
        assert_eq!(current.monitor.timeout(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloaded_file_cannot_reset_window() {
        let h = Harness::new(settings(30, 0));
        h.monitor
            .apply_update(&ConfigUpdate::new().time_range_enabled(true).start_time("10:00"))
            .unwrap();

        let update = Settings::parse_update(
            Path::new("settings.yaml"),
            "timeRangeEnabled: true\nstartTime: \"25:99\"\nendTime: \"18:00\"\n",
        )
        .unwrap();
        let err = h.monitor.apply_update(&update).unwrap_err();
        assert!(matches!(err, WatchError::ConfigRejected { .. }));
        assert_eq!(err.rejections().len(), 1);
        assert_eq!(err.rejections()[0].field, "startTime");

        let current = h.monitor.settings();
        assert_eq!(
            feedwatch_config::format_time_of_day(current.schedule.start),
            "10:00"
        );
        assert_eq!(
            feedwatch_config::format_time_of_day(current.schedule.end),
            "18:00"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_periodic_interval_keeps_realerting() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(30)]);

        let err = h
            .monitor
            .apply_update(&ConfigUpdate::new().periodic_seconds(i64::MAX))
            .unwrap_err();
        assert_eq!(err.rejections()[0].field, "periodicSeconds");
        assert_eq!(
            h.monitor.settings().monitor.periodic(),
            Some(Duration::from_secs(60))
        );

        h.at(90_500).await;
        assert_eq!(h.monitor.current_outage_state(), OutageState::PeriodicAlerting);
        assert_eq!(h.notifier.messages(), vec![alert(30), alert(90)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_timeout_used_on_next_tick() {
        let h = Harness::new(settings(30, 0));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(20_000).await;
        h.monitor.apply_config(settings(60, 0));

        h.at(55_500).await;
        assert_eq!(h.notifier.count(), 0);

        h.at(60_500).await;
        assert_eq!(h.notifier.messages(), vec![alert(60)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reflects_outage() {
        let h = Harness::new(settings(30, 60));
        h.monitor.record_event_now("ES");
        h.monitor.start_monitoring().unwrap();

        h.at(30_500).await;
        let status = h.monitor.status();
        assert!(status.monitoring);
        assert_eq!(status.outage_state, OutageState::PeriodicAlerting);
        assert_eq!(status.timed_out_at, Some(h.wall(30)));
        assert_eq!(status.last_event_at, Some(h.wall(0)));
        assert_eq!(status.source_count, 1);
        assert_eq!(status.periodic_secs, 60);
    }
}
