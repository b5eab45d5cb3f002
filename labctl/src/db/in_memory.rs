//! In-memory implementation of the [`Store`] trait.
//!
//! Stores all rows in process memory behind a read-write lock. Suitable for
//! tests and local development; everything is lost on restart. The
//! [`MemoryStore::set_fail`] switch makes every operation return a storage
//! error, which is how tests exercise the failure paths of the components
//! built on top.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    CalendarSlot, Loan, NewNotification, Notification, NotificationKey, Reservation,
    ReservationStatus, Resource, ResourceStatus, Training, UserTraining,
};
use crate::db::store::Store;
use crate::types::{LabId, ResourceId, TimeRange, TrainingId, UserId};

#[derive(Default)]
struct Inner {
    slots: Vec<CalendarSlot>,
    resources: Vec<Resource>,
    reservations: Vec<Reservation>,
    loans: Vec<Loan>,
    trainings: Vec<Training>,
    requirements: Vec<(LabId, TrainingId)>,
    user_trainings: Vec<UserTraining>,
    notifications: Vec<Notification>,
    fail: bool,
}

/// In-memory store backed by a shared row set.
///
/// Cloning is cheap and clones observe the same data, mirroring how pool
/// handles share one database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every store operation fails with a storage error until
    /// cleared again.
    pub fn set_fail(&self, fail: bool) {
        self.inner.write().fail = fail;
    }

    fn guard(&self) -> Result<()> {
        if self.inner.read().fail {
            return Err(DbError::Other(anyhow::anyhow!("injected storage failure")));
        }
        Ok(())
    }

    // Seeding helpers used by tests and local development.

    pub fn add_slot(&self, slot: CalendarSlot) {
        self.inner.write().slots.push(slot);
    }

    pub fn add_resource(&self, resource: Resource) {
        self.inner.write().resources.push(resource);
    }

    pub fn add_reservation(&self, reservation: Reservation) {
        self.inner.write().reservations.push(reservation);
    }

    pub fn add_loan(&self, loan: Loan) {
        self.inner.write().loans.push(loan);
    }

    pub fn add_training(&self, training: Training) {
        self.inner.write().trainings.push(training);
    }

    pub fn add_requirement(&self, lab_id: LabId, training_id: TrainingId) {
        self.inner.write().requirements.push((lab_id, training_id));
    }

    pub fn add_user_training(&self, completion: UserTraining) {
        self.inner.write().user_trainings.push(completion);
    }

    /// Snapshot of every stored notification, in insertion order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.read().notifications.clone()
    }
}

fn matches_key(notification: &Notification, key: &NotificationKey) -> bool {
    let stage = notification.data.get("stage").and_then(|v| v.as_str()).unwrap_or("");
    let reservation_id = notification
        .data
        .get("reservation_id")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let loan_id = notification.data.get("loan_id").and_then(|v| v.as_str()).unwrap_or("");

    notification.user_id == key.user_id
        && notification.kind == key.kind
        && stage == key.stage
        && reservation_id == key.reservation_id.map(|id| id.to_string()).unwrap_or_default()
        && loan_id == key.loan_id.map(|id| id.to_string()).unwrap_or_default()
}

#[async_trait]
impl Store for MemoryStore {
    async fn blocking_slots_for_lab(&self, lab_id: LabId, range: TimeRange) -> Result<Vec<CalendarSlot>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .slots
            .iter()
            .filter(|slot| {
                slot.lab_id == lab_id
                    && slot.status.blocks_bookings()
                    && slot.interval().overlaps(&range)
            })
            .cloned()
            .collect())
    }

    async fn blocking_slots_for_resources(
        &self,
        resource_ids: &[ResourceId],
        range: TimeRange,
    ) -> Result<Vec<CalendarSlot>> {
        self.guard()?;
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        Ok(inner
            .slots
            .iter()
            .filter(|slot| {
                slot.resource_id.is_some_and(|id| resource_ids.contains(&id))
                    && slot.status.blocks_bookings()
                    && slot.interval().overlaps(&range)
            })
            .cloned()
            .collect())
    }

    async fn unavailable_resources(&self, resource_ids: &[ResourceId]) -> Result<Vec<Resource>> {
        self.guard()?;
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        Ok(inner
            .resources
            .iter()
            .filter(|resource| {
                resource_ids.contains(&resource.id) && resource.status != ResourceStatus::Available
            })
            .cloned()
            .collect())
    }

    async fn lab_requirements(&self, lab_id: LabId) -> Result<Vec<Training>> {
        self.guard()?;
        let inner = self.inner.read();
        let required: Vec<TrainingId> = inner
            .requirements
            .iter()
            .filter(|(lab, _)| *lab == lab_id)
            .map(|(_, training_id)| *training_id)
            .collect();

        let mut trainings: Vec<Training> = inner
            .trainings
            .iter()
            .filter(|training| required.contains(&training.id))
            .cloned()
            .collect();
        trainings.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(trainings)
    }

    async fn valid_training_ids(&self, user_id: UserId, now: DateTime<Utc>) -> Result<HashSet<TrainingId>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .user_trainings
            .iter()
            .filter(|completion| completion.user_id == user_id && completion.is_valid_at(now))
            .map(|completion| completion.training_id)
            .collect())
    }

    async fn approved_reservations_starting_within(&self, window: TimeRange) -> Result<Vec<Reservation>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .reservations
            .iter()
            .filter(|reservation| {
                reservation.status == ReservationStatus::Approved
                    && window.contains(reservation.start_time)
            })
            .cloned()
            .collect())
    }

    async fn live_loans_ending_within(&self, window: TimeRange) -> Result<Vec<Loan>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .loans
            .iter()
            .filter(|loan| loan.status.is_live() && window.contains(loan.end_time))
            .cloned()
            .collect())
    }

    async fn overdue_loans(&self, now: DateTime<Utc>) -> Result<Vec<Loan>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .loans
            .iter()
            .filter(|loan| loan.status.is_live() && loan.end_time < now)
            .cloned()
            .collect())
    }

    async fn find_notification(&self, key: &NotificationKey) -> Result<Option<Notification>> {
        self.guard()?;
        let inner = self.inner.read();
        Ok(inner
            .notifications
            .iter()
            .find(|notification| matches_key(notification, key))
            .cloned())
    }

    async fn insert_notification(&self, notification: &NewNotification) -> Result<Option<Notification>> {
        self.guard()?;
        let mut inner = self.inner.write();

        // Check-and-insert under one write lock, standing in for the unique
        // index the PostgreSQL store relies on.
        let key = notification.key();
        if inner.notifications.iter().any(|existing| matches_key(existing, &key)) {
            return Ok(None);
        }

        let stored = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            data: notification.data(),
            created_at: Utc::now(),
        };
        inner.notifications.push(stored.clone());
        Ok(Some(stored))
    }

    async fn notifications_for_user(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.guard()?;
        let inner = self.inner.read();
        let mut notifications: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect();
        notifications.reverse();
        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SlotStatus;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn slot(lab_id: LabId, resource_id: Option<Uuid>, status: SlotStatus, from: u32, to: u32) -> CalendarSlot {
        CalendarSlot {
            id: Uuid::new_v4(),
            lab_id,
            resource_id,
            status,
            starts_at: at(from),
            ends_at: at(to),
            reason: None,
            created_at: at(0),
        }
    }

    #[tokio::test]
    async fn lab_slot_query_filters_status_and_overlap() {
        let store = MemoryStore::new();
        let lab_id = Uuid::new_v4();

        store.add_slot(slot(lab_id, None, SlotStatus::Blocked, 10, 12));
        store.add_slot(slot(lab_id, None, SlotStatus::Available, 10, 12));
        store.add_slot(slot(lab_id, None, SlotStatus::Reserved, 15, 16));
        store.add_slot(slot(Uuid::new_v4(), None, SlotStatus::Blocked, 10, 12));

        let range = TimeRange::new(at(11), at(13)).unwrap();
        let hits = store.blocking_slots_for_lab(lab_id, range).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, SlotStatus::Blocked);
    }

    #[tokio::test]
    async fn insert_notification_is_unique_per_key() {
        let store = MemoryStore::new();
        let notification = NewNotification {
            user_id: Uuid::new_v4(),
            kind: "loan_alert".to_string(),
            title: "Overdue".to_string(),
            message: "Loan overdue".to_string(),
            stage: "overdue".to_string(),
            reservation_id: None,
            loan_id: Some(Uuid::new_v4()),
        };

        assert!(store.insert_notification(&notification).await.unwrap().is_some());
        assert!(store.insert_notification(&notification).await.unwrap().is_none());
        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_storage_error() {
        let store = MemoryStore::new();
        store.set_fail(true);

        let err = store.overdue_loans(at(12)).await.unwrap_err();
        assert!(matches!(err, DbError::Other(_)));

        store.set_fail(false);
        assert!(store.overdue_loans(at(12)).await.is_ok());
    }
}
