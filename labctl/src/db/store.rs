//! The storage interface consumed by the availability and reminder components.
//!
//! Every query takes the instant it reasons about as an argument instead of
//! calling the database's current-time function, so callers sample their
//! injected clock once and all predicates within one operation agree on
//! "now".

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::errors::Result;
use crate::db::models::{
    CalendarSlot, Loan, NewNotification, Notification, NotificationKey, Reservation, Resource,
    Training,
};
use crate::types::{LabId, ResourceId, TimeRange, TrainingId, UserId};

/// Storage trait for the availability core.
///
/// Implementations must be safe to share across tasks; the conflict checker
/// and requirements gate run on caller tasks concurrently with the reminder
/// daemon's tick task.
#[async_trait]
pub trait Store: Send + Sync {
    /// Lab-wide and resource-scoped calendar slots for `lab_id` whose status
    /// precludes bookings and whose interval overlaps `range`.
    async fn blocking_slots_for_lab(&self, lab_id: LabId, range: TimeRange) -> Result<Vec<CalendarSlot>>;

    /// Blocking calendar slots scoped to any of `resource_ids`, overlapping
    /// `range`. Returns an empty vector for an empty id list.
    async fn blocking_slots_for_resources(
        &self,
        resource_ids: &[ResourceId],
        range: TimeRange,
    ) -> Result<Vec<CalendarSlot>>;

    /// Resources among `resource_ids` whose current status is anything other
    /// than available.
    async fn unavailable_resources(&self, resource_ids: &[ResourceId]) -> Result<Vec<Resource>>;

    /// The trainings a lab declares as prerequisites, joined with the
    /// catalog so callers can report code and name.
    async fn lab_requirements(&self, lab_id: LabId) -> Result<Vec<Training>>;

    /// Ids of the trainings a user has completed that are still valid at
    /// `now` (no expiry, or expiry strictly in the future).
    async fn valid_training_ids(&self, user_id: UserId, now: DateTime<Utc>) -> Result<HashSet<TrainingId>>;

    /// Approved reservations whose `start_time` falls within the half-open
    /// `window`.
    async fn approved_reservations_starting_within(&self, window: TimeRange) -> Result<Vec<Reservation>>;

    /// Live (approved or picked up) loans whose return deadline falls within
    /// the half-open `window`.
    async fn live_loans_ending_within(&self, window: TimeRange) -> Result<Vec<Loan>>;

    /// Live loans whose return deadline has passed. Matches every overdue
    /// loan on every call; notification dedup is what keeps alerts unique.
    async fn overdue_loans(&self, now: DateTime<Utc>) -> Result<Vec<Loan>>;

    /// Look up an existing notification row occupying the dedup key.
    async fn find_notification(&self, key: &NotificationKey) -> Result<Option<Notification>>;

    /// Insert a notification unless its dedup key is already taken.
    ///
    /// Returns the stored row, or `None` when a row with the same key
    /// already existed (including the case where a concurrent writer won
    /// the race between a caller's check and this insert).
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Option<Notification>>;

    /// All notifications emitted for a user, newest first.
    async fn notifications_for_user(&self, user_id: UserId) -> Result<Vec<Notification>>;
}
