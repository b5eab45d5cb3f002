use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A persisted alert row.
///
/// The store is append-only; delivery to a push channel or the mobile client
/// is handled elsewhere and reads these rows. `data` carries the structured
/// payload `{stage, reservation_id?, loan_id?}`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    /// Alert category, e.g. "reservation_alert" or "loan_alert"
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Structured payload carrying at least `stage` and the entity id
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// The tuple identifying a logically unique alert occurrence.
///
/// At most one notification row may exist per key; the daemon checks the
/// store for the key before inserting, and the unique index on the
/// notifications table backs the check up against racing writers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub user_id: Uuid,
    pub kind: String,
    pub stage: String,
    pub reservation_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
}

/// An alert about to be written to the store.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub stage: String,
    pub reservation_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
}

impl NewNotification {
    /// The dedup key this row would occupy.
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            user_id: self.user_id,
            kind: self.kind.clone(),
            stage: self.stage.clone(),
            reservation_id: self.reservation_id,
            loan_id: self.loan_id,
        }
    }

    /// The JSONB payload stored in the `data` column.
    pub fn data(&self) -> serde_json::Value {
        let mut data = json!({ "stage": self.stage });
        if let Some(reservation_id) = self.reservation_id {
            data["reservation_id"] = json!(reservation_id.to_string());
        }
        if let Some(loan_id) = self.loan_id {
            data["loan_id"] = json!(loan_id.to_string());
        }
        data
    }
}
