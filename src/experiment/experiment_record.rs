//! Experiment Record - one `create` invocation

use super::ExperimentPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A batch of rows created together from one [`ExperimentPlan`].
///
/// This is the root entity of an experiment store: every
/// [`ExperimentRow`](super::ExperimentRow) and every run refers to it
/// through the plan's experiment id. Keeping the whole plan makes a
/// campaign reproducible from the store alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    plan: ExperimentPlan,
    row_count: usize,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// Record a plan and the number of rows it produced.
    #[must_use]
    pub fn new(plan: ExperimentPlan, row_count: usize) -> Self {
        Self {
            plan,
            row_count,
            created_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.plan.experiment_id
    }

    /// Get the workflow name.
    #[must_use]
    pub fn workflow(&self) -> &str {
        &self.plan.workflow
    }

    /// Get the dataset identifier.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.plan.dataset
    }

    /// Get the plan the rows were created from.
    #[must_use]
    pub const fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    /// Number of rows `create` generated (before duplicates were skipped).
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
