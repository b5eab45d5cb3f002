//! # labctl: Availability & Notification Core
//!
//! `labctl` is the availability and notification core of a laboratory
//! resource booking platform. The surrounding platform (profiles, role
//! administration, inventory, report exports, the mobile client) is mostly
//! CRUD and lives in its own services; this crate owns the parts with actual
//! invariants:
//!
//! - **Conflict checking** ([`availability`]): whether a proposed time range
//!   for a lab, or for specific resources, collides with calendar blocks or
//!   a resource's current state. Intervals are half-open, so back-to-back
//!   bookings can touch without colliding.
//! - **Prerequisite gating** ([`requirements`]): whether a user holds every
//!   non-expired training a lab declares as a prerequisite.
//! - **Reminder scheduling** ([`reminders`]): a background daemon that polls
//!   reservations and loans entering reminder or overdue windows and writes
//!   at-most-once notifications per (user, type, stage, entity).
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and PostgreSQL for persistence. All storage access goes
//! through the [`db::Store`] trait; production uses [`db::PgStore`] over a
//! SQLx pool, while tests run against [`db::MemoryStore`] with a manual
//! clock, so the reminder windows and dedup behavior are exercised without a
//! database or wall-clock waiting.
//!
//! The booking workflow calls the conflict checker and requirements gate
//! synchronously before admitting a request. Independently, the reminder
//! daemon ticks on a fixed interval on a single task; ticks never overlap,
//! which together with the dedup key's unique index keeps notifications
//! at-most-once even across restarts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use labctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = labctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     labctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! The application requires a PostgreSQL database and automatically runs
//! migrations on startup:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! labctl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod availability;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod reminders;
pub mod requirements;
pub mod telemetry;
pub mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;

use crate::clock::{Clock, SystemClock};
use crate::db::{PgStore, Store};
use crate::reminders::ReminderScheduler;

pub use config::Config;
pub use types::{LabId, LoanId, NotificationId, ReservationId, ResourceId, TrainingId, UserId};

/// Application state shared across all request handlers.
///
/// Handlers construct the checker and gate per request from the shared store
/// and clock; both are cheap handle clones.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

/// Get the labctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/availability/check", post(api::handlers::check_availability))
        .route(
            "/labs/{lab_id}/users/{user_id}/requirements",
            get(api::handlers::get_requirements),
        )
        .route(
            "/users/{user_id}/notifications",
            get(api::handlers::list_user_notifications),
        )
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(api::ApiDoc::openapi()) }),
        )
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Container for background services and their lifecycle management.
///
/// Currently the reminder daemon is the only background service; the struct
/// exists so shutdown has one place to stop everything that outlives a
/// request.
pub struct BackgroundServices {
    scheduler: Arc<ReminderScheduler>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.scheduler.stop().await;
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, and starts the reminder daemon (when enabled).
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves.
/// 3. **Shutdown**: background services stop (letting an in-flight tick
///    finish), then database connections close.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        migrator().run(&pool).await?;

        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let scheduler = Arc::new(ReminderScheduler::new(
            store.clone(),
            clock.clone(),
            config.scheduler.clone(),
        ));
        if config.scheduler.enabled {
            scheduler.clone().start().await;
        } else {
            info!("Reminder scheduler disabled by configuration");
        }

        let state = AppState {
            config: config.clone(),
            store,
            clock,
        };
        let router = build_router(state);

        Ok(Self {
            router,
            config,
            pool,
            bg_services: BackgroundServices { scheduler },
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("labctl listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop the reminder daemon; an in-flight tick is allowed to finish.
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::availability::AvailabilityReport;
    use crate::clock::ManualClock;
    use crate::db::MemoryStore;
    use crate::db::models::{
        CalendarSlot, Loan, LoanStatus, Resource, ResourceStatus, SlotStatus, Training,
    };
    use crate::requirements::RequirementsReport;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn test_server(store: &MemoryStore) -> TestServer {
        let state = AppState {
            config: Config::default(),
            store: Arc::new(store.clone()),
            clock: Arc::new(ManualClock::new(noon())),
        };
        TestServer::new(build_router(state)).expect("Failed to create test server")
    }

    #[test_log::test(tokio::test)]
    async fn healthz_responds_ok() {
        let server = test_server(&MemoryStore::new());
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[test_log::test(tokio::test)]
    async fn openapi_document_is_served() {
        let server = test_server(&MemoryStore::new());
        let response = server.get("/api-docs/openapi.json").await;
        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/api/v1/availability/check"].is_object());
    }

    #[test_log::test(tokio::test)]
    async fn availability_check_reports_conflicts() {
        let store = MemoryStore::new();
        let lab_id = Uuid::new_v4();
        store.add_slot(CalendarSlot {
            id: Uuid::new_v4(),
            lab_id,
            resource_id: None,
            status: SlotStatus::Blocked,
            starts_at: noon() - Duration::hours(2),
            ends_at: noon() + Duration::hours(2),
            reason: Some("maintenance window".to_string()),
            created_at: noon() - Duration::days(1),
        });

        let server = test_server(&store);
        let response = server
            .post("/api/v1/availability/check")
            .json(&serde_json::json!({
                "lab_id": lab_id,
                "from": noon(),
                "to": noon() + Duration::hours(1),
            }))
            .await;

        response.assert_status_ok();
        let report: AvailabilityReport = response.json();
        assert!(!report.ok);
        assert_eq!(report.conflicts.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn availability_check_passes_clear_range_with_resources() {
        let store = MemoryStore::new();
        let lab_id = Uuid::new_v4();
        let resource = Resource {
            id: Uuid::new_v4(),
            lab_id,
            status: ResourceStatus::Available,
            qty_available: 3,
            created_at: noon() - Duration::days(10),
        };
        store.add_resource(resource.clone());

        let server = test_server(&store);
        let response = server
            .post("/api/v1/availability/check")
            .json(&serde_json::json!({
                "lab_id": lab_id,
                "resource_ids": [resource.id],
                "from": noon(),
                "to": noon() + Duration::hours(1),
            }))
            .await;

        response.assert_status_ok();
        let report: AvailabilityReport = response.json();
        assert!(report.ok);
        assert!(report.conflicts.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn inverted_range_is_a_bad_request() {
        let server = test_server(&MemoryStore::new());
        let response = server
            .post("/api/v1/availability/check")
            .json(&serde_json::json!({
                "lab_id": Uuid::new_v4(),
                "from": noon(),
                "to": noon() - Duration::hours(1),
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn storage_failure_maps_to_internal_error() {
        let store = MemoryStore::new();
        store.set_fail(true);

        let server = test_server(&store);
        let response = server
            .post("/api/v1/availability/check")
            .json(&serde_json::json!({
                "lab_id": Uuid::new_v4(),
                "from": noon(),
                "to": noon() + Duration::hours(1),
            }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test_log::test(tokio::test)]
    async fn requirements_endpoint_lists_missing_trainings() {
        let store = MemoryStore::new();
        let lab_id = Uuid::new_v4();
        let training = Training {
            id: Uuid::new_v4(),
            code: "SAFETY-01".to_string(),
            name: "Safety Induction".to_string(),
        };
        store.add_training(training.clone());
        store.add_requirement(lab_id, training.id);

        let server = test_server(&store);
        let response = server
            .get(&format!(
                "/api/v1/labs/{lab_id}/users/{}/requirements",
                Uuid::new_v4()
            ))
            .await;

        response.assert_status_ok();
        let report: RequirementsReport = response.json();
        assert!(!report.ok);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].code, "SAFETY-01");
    }

    #[test_log::test(tokio::test)]
    async fn notification_feed_shows_daemon_output() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(noon()));
        let user_id = Uuid::new_v4();
        store.add_loan(Loan {
            id: Uuid::new_v4(),
            user_id,
            resource_id: None,
            end_time: noon() - Duration::hours(4),
            status: LoanStatus::PickedUp,
        });

        let scheduler = ReminderScheduler::new(
            Arc::new(store.clone()),
            clock,
            config::SchedulerConfig::default(),
        );
        let summary = scheduler.run_tick().await;
        assert_eq!(summary.overdue_alerts, 1);

        let server = test_server(&store);
        let response = server.get(&format!("/api/v1/users/{user_id}/notifications")).await;
        response.assert_status_ok();

        let feed: Vec<crate::db::models::Notification> = response.json();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, "loan_alert");
        assert_eq!(feed[0].data["stage"], "overdue");

        // Other users see nothing.
        let other = server
            .get(&format!("/api/v1/users/{}/notifications", Uuid::new_v4()))
            .await;
        let empty: Vec<crate::db::models::Notification> = other.json();
        assert!(empty.is_empty());
    }
}
