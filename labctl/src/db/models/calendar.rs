use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::TimeRange;

/// Status of a calendar slot.
///
/// The set is closed on purpose: [`SlotStatus::blocks_bookings`] matches
/// exhaustively, so adding a status forces a decision about whether it
/// precludes new bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "slot_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotStatus {
    Available,
    Reserved,
    Blocked,
    Maintenance,
    Exclusive,
}

impl SlotStatus {
    /// Whether a slot in this status precludes new bookings in its interval.
    pub fn blocks_bookings(&self) -> bool {
        match self {
            SlotStatus::Available => false,
            SlotStatus::Reserved
            | SlotStatus::Blocked
            | SlotStatus::Maintenance
            | SlotStatus::Exclusive => true,
        }
    }

    /// All statuses that preclude new bookings, for `status = ANY($n)` binds.
    pub fn blocking() -> Vec<SlotStatus> {
        [
            SlotStatus::Available,
            SlotStatus::Reserved,
            SlotStatus::Blocked,
            SlotStatus::Maintenance,
            SlotStatus::Exclusive,
        ]
        .into_iter()
        .filter(SlotStatus::blocks_bookings)
        .collect()
    }
}

/// A staff-managed calendar entry occupying the half-open interval
/// `[starts_at, ends_at)`.
///
/// `resource_id = None` means the slot applies to the whole lab. The
/// availability core only ever reads these rows; lab staff create and update
/// them through the (external) calendar management screens.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CalendarSlot {
    /// Unique identifier for the slot
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// Lab the slot belongs to
    #[schema(value_type = String, format = "uuid")]
    pub lab_id: Uuid,
    /// Specific resource the slot applies to, or `None` for lab-wide
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resource_id: Option<Uuid>,
    pub status: SlotStatus,
    /// Start of the occupied interval (inclusive)
    #[schema(value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
    /// End of the occupied interval (exclusive)
    #[schema(value_type = String, format = "date-time")]
    pub ends_at: DateTime<Utc>,
    /// Free-form staff note explaining the slot
    pub reason: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl CalendarSlot {
    /// The slot's occupied interval as a [`TimeRange`].
    ///
    /// Rows satisfy the `starts_at < ends_at` table constraint, so the
    /// conversion cannot fail for persisted slots.
    pub fn interval(&self) -> TimeRange {
        TimeRange {
            start: self.starts_at,
            end: self.ends_at,
        }
    }
}
