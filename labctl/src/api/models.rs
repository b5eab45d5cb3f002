use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request payload for an availability check.
///
/// `resource_ids` may be empty to check the lab calendar only; listing ids
/// additionally checks resource-scoped calendar slots and each resource's
/// current status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityCheckRequest {
    /// Lab the booking targets
    #[schema(value_type = String, format = "uuid")]
    pub lab_id: Uuid,
    /// Specific resources requested, possibly none
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub resource_ids: Vec<Uuid>,
    /// Proposed start (inclusive)
    #[schema(value_type = String, format = "date-time")]
    pub from: DateTime<Utc>,
    /// Proposed end (exclusive)
    #[schema(value_type = String, format = "date-time")]
    pub to: DateTime<Utc>,
}
