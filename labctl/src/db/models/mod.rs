//! Database record models matching table schemas.
//!
//! Each struct here corresponds to a table row and derives `sqlx::FromRow`
//! for query results. Status columns use closed Rust enums mapped to
//! PostgreSQL enum types, so a status added to the database without a
//! matching variant fails loudly instead of silently slipping past the
//! conflict predicates.
//!
//! # Model Categories
//!
//! - [`calendar`]: staff-managed calendar slots and their statuses
//! - [`resources`]: bookable resource state
//! - [`bookings`]: reservations and loans read by the reminder daemon
//! - [`trainings`]: training catalog, per-lab requirements, user completions
//! - [`notifications`]: the append-only alert store and its dedup key

pub mod bookings;
pub mod calendar;
pub mod notifications;
pub mod resources;
pub mod trainings;

pub use bookings::{Loan, LoanStatus, Reservation, ReservationStatus};
pub use calendar::{CalendarSlot, SlotStatus};
pub use notifications::{NewNotification, Notification, NotificationKey};
pub use resources::{Resource, ResourceStatus};
pub use trainings::{Training, UserTraining};
