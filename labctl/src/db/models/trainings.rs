use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// An entry in the training catalog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Training {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// Short stable code, e.g. "SAFETY-01"
    pub code: String,
    pub name: String,
}

/// A user's completion record for a training.
///
/// A requirement is satisfied by a completion that has not expired:
/// `expires_at` is `None` (never expires) or lies strictly in the future.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserTraining {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub training_id: Uuid,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub expires_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub completed_at: DateTime<Utc>,
}

impl UserTraining {
    /// Whether this completion still counts at the given instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}
