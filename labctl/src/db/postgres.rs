//! PostgreSQL implementation of the [`Store`] trait.
//!
//! Queries are read-only except for the notification insert, which relies on
//! the `notifications_dedup_idx` unique index: a conflicting insert is
//! resolved to "already notified" rather than an error.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::Result;
use crate::db::models::{
    CalendarSlot, Loan, LoanStatus, NewNotification, Notification, NotificationKey, Reservation,
    ReservationStatus, Resource, ResourceStatus, SlotStatus, Training,
};
use crate::db::store::Store;
use crate::types::{LabId, ResourceId, TimeRange, TrainingId, UserId, abbrev_uuid};

/// Production store over a SQLx PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self), fields(lab_id = %abbrev_uuid(&lab_id)), err)]
    async fn blocking_slots_for_lab(&self, lab_id: LabId, range: TimeRange) -> Result<Vec<CalendarSlot>> {
        let slots = sqlx::query_as::<_, CalendarSlot>(
            r#"
            SELECT id, lab_id, resource_id, status, starts_at, ends_at, reason, created_at
            FROM calendar_slots
            WHERE lab_id = $1
              AND status = ANY($2)
              AND starts_at < $3
              AND ends_at > $4
            ORDER BY starts_at
            "#,
        )
        .bind(lab_id)
        .bind(SlotStatus::blocking())
        .bind(range.end)
        .bind(range.start)
        .fetch_all(&self.pool)
        .await?;

        Ok(slots)
    }

    #[instrument(skip(self, resource_ids), fields(count = resource_ids.len()), err)]
    async fn blocking_slots_for_resources(
        &self,
        resource_ids: &[ResourceId],
        range: TimeRange,
    ) -> Result<Vec<CalendarSlot>> {
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }

        let slots = sqlx::query_as::<_, CalendarSlot>(
            r#"
            SELECT id, lab_id, resource_id, status, starts_at, ends_at, reason, created_at
            FROM calendar_slots
            WHERE resource_id = ANY($1)
              AND status = ANY($2)
              AND starts_at < $3
              AND ends_at > $4
            ORDER BY starts_at
            "#,
        )
        .bind(resource_ids.to_vec())
        .bind(SlotStatus::blocking())
        .bind(range.end)
        .bind(range.start)
        .fetch_all(&self.pool)
        .await?;

        Ok(slots)
    }

    #[instrument(skip(self, resource_ids), fields(count = resource_ids.len()), err)]
    async fn unavailable_resources(&self, resource_ids: &[ResourceId]) -> Result<Vec<Resource>> {
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }

        let resources = sqlx::query_as::<_, Resource>(
            r#"
            SELECT id, lab_id, status, qty_available, created_at
            FROM resources
            WHERE id = ANY($1) AND status <> $2
            "#,
        )
        .bind(resource_ids.to_vec())
        .bind(ResourceStatus::Available)
        .fetch_all(&self.pool)
        .await?;

        Ok(resources)
    }

    #[instrument(skip(self), fields(lab_id = %abbrev_uuid(&lab_id)), err)]
    async fn lab_requirements(&self, lab_id: LabId) -> Result<Vec<Training>> {
        let trainings = sqlx::query_as::<_, Training>(
            r#"
            SELECT t.id, t.code, t.name
            FROM lab_training_requirements r
            JOIN trainings t ON t.id = r.training_id
            WHERE r.lab_id = $1
            ORDER BY t.code
            "#,
        )
        .bind(lab_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(trainings)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn valid_training_ids(&self, user_id: UserId, now: DateTime<Utc>) -> Result<HashSet<TrainingId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT training_id
            FROM user_trainings
            WHERE user_id = $1
              AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    #[instrument(skip(self), err)]
    async fn approved_reservations_starting_within(&self, window: TimeRange) -> Result<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, user_id, resource_id, start_time, status
            FROM reservations
            WHERE status = $1
              AND start_time >= $2
              AND start_time < $3
            "#,
        )
        .bind(ReservationStatus::Approved)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    #[instrument(skip(self), err)]
    async fn live_loans_ending_within(&self, window: TimeRange) -> Result<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, resource_id, end_time, status
            FROM loans
            WHERE status = ANY($1)
              AND end_time >= $2
              AND end_time < $3
            "#,
        )
        .bind(LoanStatus::live())
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    #[instrument(skip(self), err)]
    async fn overdue_loans(&self, now: DateTime<Utc>) -> Result<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, resource_id, end_time, status
            FROM loans
            WHERE status = ANY($1) AND end_time < $2
            "#,
        )
        .bind(LoanStatus::live())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    #[instrument(skip(self, key), fields(kind = %key.kind, stage = %key.stage), err)]
    async fn find_notification(&self, key: &NotificationKey) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, type, title, message, data, created_at
            FROM notifications
            WHERE user_id = $1
              AND type = $2
              AND data ->> 'stage' = $3
              AND COALESCE(data ->> 'reservation_id', '') = $4
              AND COALESCE(data ->> 'loan_id', '') = $5
            "#,
        )
        .bind(key.user_id)
        .bind(&key.kind)
        .bind(&key.stage)
        .bind(key.reservation_id.map(|id| id.to_string()).unwrap_or_default())
        .bind(key.loan_id.map(|id| id.to_string()).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    #[instrument(skip(self, notification), fields(kind = %notification.kind, stage = %notification.stage), err)]
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Option<Notification>> {
        // ON CONFLICT DO NOTHING resolves a lost dedup race to "already
        // notified" instead of a unique-violation error.
        let inserted = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, type, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING id, user_id, type, title, message, data, created_at
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.data())
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn notifications_for_user(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, type, title, message, data, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }
}
