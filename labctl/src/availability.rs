//! Conflict checking for proposed bookings.
//!
//! [`ConflictChecker`] answers one question: can this lab (and optionally
//! these specific resources) be booked for this time range right now? It is
//! a pure query over the calendar and resource tables; the booking workflow
//! consults it before admitting a request, together with the
//! [requirements gate](crate::requirements).
//!
//! A storage failure propagates to the caller, which must treat it as
//! "availability unknown" and refuse the booking rather than assume success.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::db::Store;
use crate::db::models::{CalendarSlot, Resource};
use crate::errors::Result;
use crate::types::{LabId, ResourceId, TimeRange, abbrev_uuid};

/// A single reason a proposed booking cannot proceed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conflict {
    /// Lab-wide calendar slots overlapping the requested range
    LabSlot { slots: Vec<CalendarSlot> },
    /// Calendar slots scoped to one of the requested resources
    ResourceSlot { slots: Vec<CalendarSlot> },
    /// Requested resources whose current status rules them out regardless
    /// of the calendar
    ResourceUnavailable { resources: Vec<Resource> },
}

/// Outcome of an availability check.
///
/// `ok` holds exactly when `conflicts` is empty.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityReport {
    pub ok: bool,
    pub conflicts: Vec<Conflict>,
}

/// Read-only checker for booking collisions.
#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn Store>,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Report every conflict between the proposed booking and the current
    /// calendar and resource state.
    ///
    /// The range is half-open, so a booking starting exactly when a blocking
    /// slot ends (or ending exactly when one starts) does not conflict.
    /// Deterministic given an unchanged database; never mutates anything.
    #[instrument(skip(self, resource_ids), fields(lab_id = %abbrev_uuid(&lab_id), resources = resource_ids.len()), err)]
    pub async fn check_availability(
        &self,
        lab_id: LabId,
        resource_ids: &[ResourceId],
        range: TimeRange,
    ) -> Result<AvailabilityReport> {
        let mut conflicts = Vec::new();

        let lab_slots = self.store.blocking_slots_for_lab(lab_id, range).await?;
        if !lab_slots.is_empty() {
            conflicts.push(Conflict::LabSlot { slots: lab_slots });
        }

        if !resource_ids.is_empty() {
            let resource_slots = self
                .store
                .blocking_slots_for_resources(resource_ids, range)
                .await?;
            if !resource_slots.is_empty() {
                conflicts.push(Conflict::ResourceSlot { slots: resource_slots });
            }

            let unavailable = self.store.unavailable_resources(resource_ids).await?;
            if !unavailable.is_empty() {
                conflicts.push(Conflict::ResourceUnavailable { resources: unavailable });
            }
        }

        Ok(AvailabilityReport {
            ok: conflicts.is_empty(),
            conflicts,
        })
    }
}
