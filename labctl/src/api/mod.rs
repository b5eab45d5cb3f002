//! HTTP surface of the availability core.
//!
//! The booking workflow and the mobile client consume three things here:
//! the availability check, the requirements check, and the per-user
//! notification feed. Everything else about the platform (profiles, CRUD
//! screens, exports) lives in its own service and is not routed through this
//! one.

pub mod handlers;
pub mod models;

use utoipa::OpenApi;

use crate::availability::{AvailabilityReport, Conflict};
use crate::db::models::{CalendarSlot, Notification, Resource, ResourceStatus, SlotStatus};
use crate::requirements::{MissingTraining, RequirementsReport};

/// OpenAPI document for the availability API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "labctl availability API",
        description = "Availability checks, training prerequisites and booking reminders"
    ),
    paths(
        handlers::check_availability,
        handlers::get_requirements,
        handlers::list_user_notifications,
    ),
    components(schemas(
        models::AvailabilityCheckRequest,
        AvailabilityReport,
        Conflict,
        CalendarSlot,
        SlotStatus,
        Resource,
        ResourceStatus,
        RequirementsReport,
        MissingTraining,
        Notification,
    ))
)]
pub struct ApiDoc;
