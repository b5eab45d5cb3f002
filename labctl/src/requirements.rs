//! Training prerequisite checking.
//!
//! Labs can declare trainings a user must hold before booking. The gate
//! compares the lab's declared set against the user's valid (non-expired)
//! completions and reports what is missing. Labs with no declared
//! requirements impose none, so the common case returns without touching the
//! user's training records at all.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::db::Store;
use crate::errors::Result;
use crate::types::{LabId, TrainingId, UserId, abbrev_uuid};

/// A requirement the user has not satisfied.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MissingTraining {
    #[schema(value_type = String, format = "uuid")]
    pub id: TrainingId,
    pub code: String,
    pub name: String,
}

/// Outcome of a prerequisite check. `ok` holds exactly when `missing` is
/// empty.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequirementsReport {
    pub ok: bool,
    pub missing: Vec<MissingTraining>,
}

/// Prerequisite gate consulted by the booking workflow before admission.
#[derive(Clone)]
pub struct RequirementsGate {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RequirementsGate {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Compute the trainings `user_id` is still missing for `lab_id`.
    ///
    /// Expiry is judged against a single clock sample taken at the start of
    /// the call.
    #[instrument(skip(self), fields(lab_id = %abbrev_uuid(&lab_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn requirements_ok(&self, lab_id: LabId, user_id: UserId) -> Result<RequirementsReport> {
        let required = self.store.lab_requirements(lab_id).await?;
        if required.is_empty() {
            return Ok(RequirementsReport { ok: true, missing: Vec::new() });
        }

        let now = self.clock.now();
        let completed = self.store.valid_training_ids(user_id, now).await?;

        let missing: Vec<MissingTraining> = required
            .into_iter()
            .filter(|training| !completed.contains(&training.id))
            .map(|training| MissingTraining {
                id: training.id,
                code: training.code,
                name: training.name,
            })
            .collect();

        Ok(RequirementsReport {
            ok: missing.is_empty(),
            missing,
        })
    }
}
