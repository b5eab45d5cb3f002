use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::AppState;
use crate::api::models::AvailabilityCheckRequest;
use crate::availability::{AvailabilityReport, ConflictChecker};
use crate::db::models::Notification;
use crate::errors::Error;
use crate::requirements::{RequirementsGate, RequirementsReport};
use crate::types::TimeRange;

/// Check whether a proposed booking collides with calendar blocks or
/// resource state.
///
/// A storage failure surfaces as a 500; callers must treat that as
/// "availability unknown" and retry, never as a green light.
#[utoipa::path(
    post,
    path = "/api/v1/availability/check",
    request_body = AvailabilityCheckRequest,
    responses(
        (status = 200, description = "Conflict report for the proposed booking", body = AvailabilityReport),
        (status = 400, description = "Invalid time range (from must be before to)"),
        (status = 500, description = "Availability unknown, storage unreachable")
    ),
    tag = "availability"
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Json(request): Json<AvailabilityCheckRequest>,
) -> Result<Json<AvailabilityReport>, Error> {
    let range = TimeRange::new(request.from, request.to)?;
    let checker = ConflictChecker::new(state.store.clone());
    let report = checker
        .check_availability(request.lab_id, &request.resource_ids, range)
        .await?;
    Ok(Json(report))
}

/// Report which of a lab's training prerequisites a user is missing.
#[utoipa::path(
    get,
    path = "/api/v1/labs/{lab_id}/users/{user_id}/requirements",
    params(
        ("lab_id" = Uuid, Path, description = "Lab whose prerequisites apply"),
        ("user_id" = Uuid, Path, description = "User attempting to book")
    ),
    responses(
        (status = 200, description = "Prerequisite report", body = RequirementsReport),
        (status = 500, description = "Storage unreachable")
    ),
    tag = "requirements"
)]
pub async fn get_requirements(
    State(state): State<AppState>,
    Path((lab_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RequirementsReport>, Error> {
    let gate = RequirementsGate::new(state.store.clone(), state.clock.clone());
    let report = gate.requirements_ok(lab_id, user_id).await?;
    Ok(Json(report))
}

/// List the notifications emitted for a user, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient")
    ),
    responses(
        (status = 200, description = "Notifications, newest first", body = Vec<Notification>),
        (status = 500, description = "Storage unreachable")
    ),
    tag = "notifications"
)]
pub async fn list_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, Error> {
    let notifications = state.store.notifications_for_user(user_id).await?;
    Ok(Json(notifications))
}
