//! At-most-once delivery into the notification store.

use std::sync::Arc;

use tracing::instrument;

use crate::db::Store;
use crate::db::models::{NewNotification, Notification};
use crate::errors::Result;

/// What happened to a candidate notification.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// A new row was written
    Delivered(Notification),
    /// A row with the same dedup key already existed
    AlreadyNotified,
}

impl DeliveryOutcome {
    pub fn was_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Writes notifications while suppressing duplicates.
///
/// The read-before-write check keeps the common case cheap; the store's
/// insert is what actually guarantees uniqueness when two writers race
/// between the check and the insert (the PostgreSQL store backs it with a
/// unique index, the in-memory store with a single write lock).
#[derive(Clone)]
pub struct NotificationDeduper {
    store: Arc<dyn Store>,
}

impl NotificationDeduper {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert `notification` unless an equivalent one was already emitted.
    #[instrument(skip(self, notification), fields(kind = %notification.kind, stage = %notification.stage), err)]
    pub async fn deliver(&self, notification: &NewNotification) -> Result<DeliveryOutcome> {
        if self.store.find_notification(&notification.key()).await?.is_some() {
            return Ok(DeliveryOutcome::AlreadyNotified);
        }

        match self.store.insert_notification(notification).await? {
            Some(stored) => Ok(DeliveryOutcome::Delivered(stored)),
            None => Ok(DeliveryOutcome::AlreadyNotified),
        }
    }
}
