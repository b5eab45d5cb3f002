//! Common type definitions shared across the crate.
//!
//! This module defines:
//! - Type aliases for entity IDs (LabId, ResourceId, etc.)
//! - The [`TimeRange`] half-open interval value type used by the conflict
//!   checker and the reminder daemon
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety:
//!
//! - [`LabId`]: Laboratory identifier
//! - [`ResourceId`]: Bookable resource identifier
//! - [`UserId`]: Platform user identifier
//! - [`ReservationId`] / [`LoanId`]: Booking entity identifiers
//! - [`TrainingId`]: Training catalog identifier
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::Error;

// Type aliases for IDs
pub type LabId = Uuid;
pub type ResourceId = Uuid;
pub type UserId = Uuid;
pub type ReservationId = Uuid;
pub type LoanId = Uuid;
pub type TrainingId = Uuid;
pub type NotificationId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// A half-open time interval `[start, end)`.
///
/// `start` is inclusive and `end` is exclusive, so two ranges that merely
/// touch at a boundary do not overlap. This is what lets back-to-back
/// bookings share a boundary instant without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Half-open overlap test: `self.start < other.end && other.start < self.end`.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether an instant falls inside the range (`start` inclusive, `end` exclusive).
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}
