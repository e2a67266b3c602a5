//! Execution of experiment rows
//!
//! Every row gets its own timer, workflow factory and controller; rows
//! share only the read-only dataset and registry, so they can run on the
//! rayon pool without coordination.
//!
//! A row whose workflow fails is still a successful run: the failure is
//! recorded in its report. A run fails only when no report can be produced
//! (undecodable row, impossible split, unwritable output).

use crate::controller::LcController;
use crate::curvedb::Report;
use crate::data::Dataset;
use crate::experiment::{CurvePoint, ExperimentRow, ExperimentStore, RunRecord};
use crate::timer::Timer;
use crate::workflow::WorkflowRegistry;
use crate::Result;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of running one row
#[derive(Debug)]
pub struct RunOutcome {
    /// Final state of the run
    pub record: RunRecord,
    /// The report, when one was produced
    pub report: Option<Report>,
    /// Flattened curve points of the report
    pub points: Vec<CurvePoint>,
}

/// Runs experiment rows against one dataset
#[derive(Debug)]
pub struct Runner<'a> {
    registry: &'a WorkflowRegistry,
    dataset: &'a Dataset,
    reports_dir: Option<PathBuf>,
}

impl<'a> Runner<'a> {
    /// Create a runner that keeps reports in memory only
    #[must_use]
    pub const fn new(registry: &'a WorkflowRegistry, dataset: &'a Dataset) -> Self {
        Self {
            registry,
            dataset,
            reports_dir: None,
        }
    }

    /// Also write every report to `<dir>/<row_id>.json`
    #[must_use]
    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    /// Run one row to completion
    #[must_use]
    pub fn run_row(&self, row: &ExperimentRow) -> RunOutcome {
        let mut record = RunRecord::new(&row.row_id, &row.experiment_id);
        record.start();
        info!(row = %row.row_id, workflow = %row.workflow, "starting run");

        match self.build_report(row) {
            Ok((report, path)) => {
                let points = CurvePoint::from_report(&row.row_id, &report);
                info!(
                    row = %row.row_id,
                    objective = ?report.objective,
                    anchors = report.curve_db.val.len(),
                    "run finished"
                );
                record.succeed(report.objective, path.map(|p| p.display().to_string()));
                RunOutcome {
                    record,
                    report: Some(report),
                    points,
                }
            }
            Err(err) => {
                warn!(row = %row.row_id, "run failed: {err}");
                record.fail(err.to_string());
                RunOutcome {
                    record,
                    report: None,
                    points: Vec::new(),
                }
            }
        }
    }

    fn build_report(&self, row: &ExperimentRow) -> Result<(Report, Option<PathBuf>)> {
        let hyperparameters = row.hyperparameters()?;
        let factory = self.registry.factory(&row.workflow, &hyperparameters)?;
        let config = row.controller_config()?;

        let mut controller = LcController::new(Timer::new(), factory, self.dataset, config)?;
        let expected = row.train_sizes()?;
        if controller.anchors() != expected.as_slice() {
            warn!(
                row = %row.row_id,
                ?expected,
                actual = ?controller.anchors(),
                "anchor schedule differs from the one recorded at creation"
            );
        }
        controller.build_curves()?;
        let report = controller.into_report();

        let path = match &self.reports_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{}.json", row.row_id));
                report.save_json(&path)?;
                Some(path)
            }
            None => None,
        };
        Ok((report, path))
    }

    /// Run rows in order, or on the rayon pool when `parallel` is set
    ///
    /// Outcomes are returned in row order either way.
    #[must_use]
    pub fn run_rows(&self, rows: &[ExperimentRow], parallel: bool) -> Vec<RunOutcome> {
        if parallel {
            rows.par_iter().map(|row| self.run_row(row)).collect()
        } else {
            rows.iter().map(|row| self.run_row(row)).collect()
        }
    }
}

/// Record outcomes in the store and return all their curve points
pub fn record_outcomes(store: &mut ExperimentStore, outcomes: Vec<RunOutcome>) -> Vec<CurvePoint> {
    let mut all_points = Vec::new();
    for outcome in outcomes {
        store.add_run(outcome.record);
        all_points.extend(outcome.points);
    }
    store.add_points(all_points.iter().cloned());
    all_points
}
