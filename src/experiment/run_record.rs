//! Run Record - execution of one experiment row

use crate::curvedb::Objective;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Controller is building the curves.
    Running,
    /// A report was produced (possibly with a failure sentinel objective).
    Success,
    /// No report could be produced (configuration or I/O error).
    Failed,
}

/// Run Record tracks the execution of one experiment row.
///
/// A run whose workflow failed on every anchor is still a `Success`: the
/// failure is part of the report. `Failed` means the controller itself
/// could not run (bad configuration, unreadable dataset, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    objective: Option<Objective>,
    error: Option<String>,
    report_path: Option<String>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Identifier of the run, the row ID it executes
    /// * `experiment_id` - ID of the parent experiment
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            objective: None,
            error: None,
            report_path: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Get the objective of a successful run.
    #[must_use]
    pub const fn objective(&self) -> Option<Objective> {
        self.objective
    }

    /// Get the error of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Get the path of the written report, if any.
    #[must_use]
    pub fn report_path(&self) -> Option<&str> {
        self.report_path.as_deref()
    }

    /// Start the run, transitioning from Pending to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with a report.
    pub fn succeed(&mut self, objective: Option<Objective>, report_path: Option<String>) {
        self.objective = objective;
        self.report_path = report_path;
        self.finish(RunStatus::Success);
    }

    /// Complete the run without a report.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(RunStatus::Failed);
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}
