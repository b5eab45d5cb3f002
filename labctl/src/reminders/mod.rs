//! Background reminder daemon.
//!
//! The [`ReminderScheduler`] polls the booking tables on a fixed interval
//! and writes alerts into the notification store: staged reminders ahead of
//! reservation starts and loan return deadlines, plus an overdue alert once
//! a loan's deadline has passed. Delivery to any real channel is someone
//! else's job; this daemon only produces rows.
//!
//! Every tick runs on one task, so ticks never overlap and the
//! check-then-insert dedup in [`NotificationDeduper`] cannot race itself.
//! The overdue query deliberately matches every overdue loan on every tick;
//! dedup, not the query predicate, is what keeps alerts at-most-once.
//!
//! Tick failures are logged and swallowed. A broken database connection
//! costs a polling cycle, never the daemon.

pub mod dedup;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::clock::Clock;
use crate::config::{ReminderStageConfig, SchedulerConfig};
use crate::db::Store;
use crate::db::models::{Loan, NewNotification, Reservation};
use crate::errors::Result;
use crate::types::{TimeRange, abbrev_uuid};

pub use dedup::{DeliveryOutcome, NotificationDeduper};

/// Notification type for reservation reminders.
pub const RESERVATION_ALERT: &str = "reservation_alert";
/// Notification type for loan reminders and overdue alerts.
pub const LOAN_ALERT: &str = "loan_alert";
/// Stage label for the overdue check.
pub const OVERDUE_STAGE: &str = "overdue";

/// Counters for one polling tick, mainly for logs and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Reservation reminders written this tick
    pub reservation_reminders: usize,
    /// Loan reminders written this tick
    pub loan_reminders: usize,
    /// Overdue alerts written this tick
    pub overdue_alerts: usize,
    /// Phases that failed with a storage error
    pub failures: usize,
}

impl TickSummary {
    pub fn total_inserted(&self) -> usize {
        self.reservation_reminders + self.loan_reminders + self.overdue_alerts
    }
}

enum SchedulerState {
    Stopped,
    Running {
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    },
}

/// Polling daemon emitting deduplicated booking reminders.
///
/// The scheduler is either `Stopped` or `Running`; [`start`](Self::start) is
/// idempotent and [`stop`](Self::stop) lets an in-flight tick finish before
/// returning. Clock and store are injected so tests can drive ticks with a
/// frozen clock and an in-memory store.
pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    deduper: NotificationDeduper,
    state: tokio::sync::Mutex<SchedulerState>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        let deduper = NotificationDeduper::new(store.clone());
        Self {
            store,
            clock,
            config,
            deduper,
            state: tokio::sync::Mutex::new(SchedulerState::Stopped),
        }
    }

    /// Start the polling task. No-op if already running.
    ///
    /// The first tick fires immediately, then every `poll_interval`.
    pub async fn start(self: Arc<Self>) {
        let mut state = self.state.lock().await;
        if matches!(*state, SchedulerState::Running { .. }) {
            tracing::debug!("Reminder scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.run_loop(token).await;
        });

        *state = SchedulerState::Running { shutdown, handle };
        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            stages = self.config.stages.len(),
            "Reminder scheduler started"
        );
    }

    /// Stop the polling task and wait for any in-flight tick to finish.
    /// Future ticks are cancelled; the tick currently executing is not.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let SchedulerState::Running { shutdown, handle } =
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        {
            shutdown.cancel();
            let _ = handle.await;
            tracing::info!("Reminder scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, SchedulerState::Running { .. })
    }

    async fn run_loop(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_tick().await;
                    if summary.total_inserted() > 0 || summary.failures > 0 {
                        tracing::info!(?summary, "Reminder tick finished");
                    } else {
                        tracing::debug!("Reminder tick finished, nothing due");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Reminder loop shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one polling tick.
    ///
    /// Samples the clock once and evaluates the three checks in order:
    /// reservation reminders, loan reminders, overdue loans. Each check is
    /// independent; a storage failure in one is logged and counted without
    /// aborting the others.
    pub async fn run_tick(&self) -> TickSummary {
        let now = self.clock.now();
        let mut summary = TickSummary::default();

        match self.reservation_reminders(now).await {
            Ok(count) => summary.reservation_reminders = count,
            Err(e) => {
                summary.failures += 1;
                tracing::warn!(error = %e, "Reservation reminder check failed");
            }
        }

        match self.loan_reminders(now).await {
            Ok(count) => summary.loan_reminders = count,
            Err(e) => {
                summary.failures += 1;
                tracing::warn!(error = %e, "Loan reminder check failed");
            }
        }

        match self.overdue_loans(now).await {
            Ok(count) => summary.overdue_alerts = count,
            Err(e) => {
                summary.failures += 1;
                tracing::warn!(error = %e, "Overdue loan check failed");
            }
        }

        summary
    }

    /// The half-open match window for a stage: the stage checkpoint plus or
    /// minus the configured tolerance.
    fn stage_window(&self, now: DateTime<Utc>, stage: &ReminderStageConfig) -> Result<TimeRange> {
        let checkpoint = now + Duration::minutes(stage.lead_minutes);
        let tolerance = Duration::minutes(self.config.window_tolerance_minutes);
        TimeRange::new(checkpoint - tolerance, checkpoint + tolerance)
    }

    #[instrument(skip(self, now), err)]
    async fn reservation_reminders(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inserted = 0;

        for stage in &self.config.stages {
            let window = self.stage_window(now, stage)?;
            let due = self.store.approved_reservations_starting_within(window).await?;

            for reservation in due {
                let outcome = self.deduper.deliver(&reservation_reminder(&reservation, stage)).await?;
                if outcome.was_delivered() {
                    tracing::debug!(
                        reservation_id = %abbrev_uuid(&reservation.id),
                        stage = %stage.label,
                        "Emitted reservation reminder"
                    );
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    #[instrument(skip(self, now), err)]
    async fn loan_reminders(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inserted = 0;

        for stage in &self.config.stages {
            let window = self.stage_window(now, stage)?;
            let due = self.store.live_loans_ending_within(window).await?;

            for loan in due {
                let outcome = self.deduper.deliver(&loan_reminder(&loan, stage)).await?;
                if outcome.was_delivered() {
                    tracing::debug!(
                        loan_id = %abbrev_uuid(&loan.id),
                        stage = %stage.label,
                        "Emitted loan reminder"
                    );
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    #[instrument(skip(self, now), err)]
    async fn overdue_loans(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inserted = 0;

        let overdue = self.store.overdue_loans(now).await?;
        for loan in overdue {
            let outcome = self.deduper.deliver(&overdue_alert(&loan)).await?;
            if outcome.was_delivered() {
                tracing::debug!(loan_id = %abbrev_uuid(&loan.id), "Emitted overdue alert");
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}

fn reservation_reminder(reservation: &Reservation, stage: &ReminderStageConfig) -> NewNotification {
    NewNotification {
        user_id: reservation.user_id,
        kind: RESERVATION_ALERT.to_string(),
        title: "Upcoming reservation".to_string(),
        message: format!(
            "Your reservation starts at {}",
            reservation.start_time.to_rfc3339()
        ),
        stage: stage.label.clone(),
        reservation_id: Some(reservation.id),
        loan_id: None,
    }
}

fn loan_reminder(loan: &Loan, stage: &ReminderStageConfig) -> NewNotification {
    NewNotification {
        user_id: loan.user_id,
        kind: LOAN_ALERT.to_string(),
        title: "Loan return due".to_string(),
        message: format!("Your loan is due back at {}", loan.end_time.to_rfc3339()),
        stage: stage.label.clone(),
        reservation_id: None,
        loan_id: Some(loan.id),
    }
}

fn overdue_alert(loan: &Loan) -> NewNotification {
    NewNotification {
        user_id: loan.user_id,
        kind: LOAN_ALERT.to_string(),
        title: "Loan overdue".to_string(),
        message: format!("Your loan was due back at {}", loan.end_time.to_rfc3339()),
        stage: OVERDUE_STAGE.to_string(),
        reservation_id: None,
        loan_id: Some(loan.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::MemoryStore;
    use crate::db::models::{Loan, LoanStatus, Reservation, ReservationStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn reservation(start_time: DateTime<Utc>, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resource_id: None,
            start_time,
            status,
        }
    }

    fn loan(end_time: DateTime<Utc>, status: LoanStatus) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resource_id: None,
            end_time,
            status,
        }
    }

    struct Harness {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        scheduler: Arc<ReminderScheduler>,
    }

    fn harness() -> Harness {
        harness_with_config(SchedulerConfig::default())
    }

    fn harness_with_config(config: SchedulerConfig) -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(noon()));
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(store.clone()),
            clock.clone(),
            config,
        ));
        Harness { store, clock, scheduler }
    }

    #[tokio::test]
    async fn reservation_in_24h_window_gets_one_reminder() {
        let h = harness();
        h.store
            .add_reservation(reservation(noon() + Duration::hours(24), ReservationStatus::Approved));

        let first = h.scheduler.run_tick().await;
        assert_eq!(first.reservation_reminders, 1);

        // One minute later the reservation is still inside the window, but
        // the alert already exists.
        h.clock.advance(Duration::minutes(1));
        let second = h.scheduler.run_tick().await;
        assert_eq!(second.reservation_reminders, 0);
        assert_eq!(second.failures, 0);

        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, RESERVATION_ALERT);
        assert_eq!(notifications[0].data["stage"], "t-24h");
    }

    #[tokio::test]
    async fn each_stage_fires_separately_for_the_same_reservation() {
        let h = harness();
        let booked = reservation(noon() + Duration::hours(24), ReservationStatus::Approved);
        h.store.add_reservation(booked.clone());

        assert_eq!(h.scheduler.run_tick().await.reservation_reminders, 1);

        // 23 hours later the same reservation enters the t-1h window.
        h.clock.advance(Duration::hours(23));
        let summary = h.scheduler.run_tick().await;
        assert_eq!(summary.reservation_reminders, 1);

        let stages: Vec<String> = h
            .store
            .notifications()
            .iter()
            .map(|n| n.data["stage"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(stages, vec!["t-24h".to_string(), "t-1h".to_string()]);
    }

    #[tokio::test]
    async fn reservations_outside_windows_are_ignored() {
        let h = harness();
        h.store
            .add_reservation(reservation(noon() + Duration::hours(5), ReservationStatus::Approved));
        h.store
            .add_reservation(reservation(noon() + Duration::hours(24) + Duration::minutes(2), ReservationStatus::Approved));

        let summary = h.scheduler.run_tick().await;
        assert_eq!(summary.total_inserted(), 0);
    }

    #[tokio::test]
    async fn non_approved_reservations_get_no_reminders() {
        let h = harness();
        h.store
            .add_reservation(reservation(noon() + Duration::hours(24), ReservationStatus::Pending));
        h.store
            .add_reservation(reservation(noon() + Duration::hours(24), ReservationStatus::Cancelled));

        assert_eq!(h.scheduler.run_tick().await.total_inserted(), 0);
    }

    #[tokio::test]
    async fn loan_deadline_reminders_fire_for_live_loans_only() {
        let h = harness();
        h.store.add_loan(loan(noon() + Duration::hours(1), LoanStatus::PickedUp));
        h.store.add_loan(loan(noon() + Duration::hours(1), LoanStatus::Returned));

        let summary = h.scheduler.run_tick().await;
        assert_eq!(summary.loan_reminders, 1);

        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, LOAN_ALERT);
        assert_eq!(notifications[0].data["stage"], "t-1h");
    }

    #[tokio::test]
    async fn overdue_loan_is_alerted_once_ever() {
        let h = harness();
        let late = loan(noon() - Duration::hours(2), LoanStatus::PickedUp);
        h.store.add_loan(late.clone());

        let first = h.scheduler.run_tick().await;
        assert_eq!(first.overdue_alerts, 1);

        // The loan stays overdue and matches the query on every subsequent
        // tick; dedup keeps the alert count at one.
        for _ in 0..3 {
            h.clock.advance(Duration::minutes(60));
            let summary = h.scheduler.run_tick().await;
            assert_eq!(summary.overdue_alerts, 0);
        }

        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].data["stage"], OVERDUE_STAGE);
        assert_eq!(notifications[0].data["loan_id"], late.id.to_string());
    }

    #[tokio::test]
    async fn repeated_tick_against_unchanged_data_inserts_nothing() {
        let h = harness();
        h.store
            .add_reservation(reservation(noon() + Duration::hours(24), ReservationStatus::Approved));
        h.store
            .add_reservation(reservation(noon() + Duration::hours(1), ReservationStatus::Approved));
        h.store.add_loan(loan(noon() + Duration::hours(24), LoanStatus::Approved));
        h.store.add_loan(loan(noon() + Duration::hours(1), LoanStatus::PickedUp));
        h.store.add_loan(loan(noon() - Duration::hours(6), LoanStatus::PickedUp));

        let first = h.scheduler.run_tick().await;
        assert_eq!(first.reservation_reminders, 2);
        assert_eq!(first.loan_reminders, 2);
        assert_eq!(first.overdue_alerts, 1);

        let second = h.scheduler.run_tick().await;
        assert_eq!(second, TickSummary::default());
        assert_eq!(h.store.notifications().len(), 5);
    }

    #[tokio::test]
    async fn storage_failure_is_absorbed_and_recovered_from() {
        let h = harness();
        h.store.add_loan(loan(noon() - Duration::hours(1), LoanStatus::Approved));

        h.store.set_fail(true);
        let failed = h.scheduler.run_tick().await;
        assert_eq!(failed.failures, 3);
        assert_eq!(failed.total_inserted(), 0);

        // Next tick sees a healthy store and catches up.
        h.store.set_fail(false);
        let recovered = h.scheduler.run_tick().await;
        assert_eq!(recovered.overdue_alerts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_halts_future_ticks() {
        let h = harness_with_config(SchedulerConfig {
            poll_interval: std::time::Duration::from_secs(5),
            ..SchedulerConfig::default()
        });
        h.store.add_loan(loan(noon() - Duration::hours(1), LoanStatus::PickedUp));

        h.scheduler.clone().start().await;
        h.scheduler.clone().start().await; // second call is a no-op
        assert!(h.scheduler.is_running().await);

        // First tick fires immediately after start.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.store.notifications().len(), 1);

        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running().await);

        // New overdue loan after stop: no tick should pick it up.
        h.store.add_loan(loan(noon() - Duration::hours(3), LoanStatus::PickedUp));
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(h.store.notifications().len(), 1);

        // Restarting resumes polling.
        h.scheduler.clone().start().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.store.notifications().len(), 2);
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_when_already_stopped_is_a_no_op() {
        let h = harness();
        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running().await);
    }
}
