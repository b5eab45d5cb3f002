use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Cancelled,
    Completed,
}

/// Lifecycle status of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    PickedUp,
    Returned,
    Cancelled,
}

impl LoanStatus {
    /// Whether the loan is still out and thus subject to reminders and
    /// overdue checks.
    pub fn is_live(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::PickedUp)
    }

    /// The live statuses, for `status = ANY($n)` binds.
    pub fn live() -> Vec<LoanStatus> {
        vec![LoanStatus::Approved, LoanStatus::PickedUp]
    }
}

/// A booking of a lab (and optionally a specific resource) for a time slot.
///
/// Created by the external booking workflow; the reminder daemon reads the
/// approved ones whose start time approaches.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resource_id: Option<Uuid>,
    #[schema(value_type = String, format = "date-time")]
    pub start_time: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// A take-home loan of a resource. `end_time` is the return deadline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: Uuid,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resource_id: Option<Uuid>,
    #[schema(value_type = String, format = "date-time")]
    pub end_time: DateTime<Utc>,
    pub status: LoanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_loan_statuses() {
        assert!(LoanStatus::Approved.is_live());
        assert!(LoanStatus::PickedUp.is_live());
        assert!(!LoanStatus::Returned.is_live());
        assert!(!LoanStatus::Cancelled.is_live());
        assert!(!LoanStatus::Pending.is_live());
        assert_eq!(LoanStatus::live(), vec![LoanStatus::Approved, LoanStatus::PickedUp]);
    }
}
