//! Experiment Store - experiments, rows, runs and curve points
//!
//! The store is an in-memory index persisted as one JSON document.
//! Curve points are additionally exported to Parquet by
//! [`crate::storage::CurveStore`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{CurvePoint, ExperimentRecord, ExperimentRow, RunRecord};
use crate::curvedb::SplitName;
use crate::Result;

/// In-memory store for experiment tracking data.
///
/// ## Design
///
/// Experiments and runs are keyed by ID for O(1) lookups; rows keep
/// creation order; curve points are stored flat and filtered per query.
///
/// ## Curve queries
///
/// [`ExperimentStore::get_curve`] returns the points of one
/// (run, split, metric) ordered by anchor.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExperimentStore {
    experiments: HashMap<String, ExperimentRecord>,
    rows: Vec<ExperimentRow>,
    runs: HashMap<String, RunRecord>,
    points: Vec<CurvePoint>,
}

impl ExperimentStore {
    /// Create a new empty experiment store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.rows.is_empty() && self.runs.is_empty() && self.points.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of rows in the store.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of curve points in the store.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Add an experiment to the store.
    pub fn add_experiment(&mut self, experiment: ExperimentRecord) {
        self.experiments
            .insert(experiment.experiment_id().to_string(), experiment);
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: &str) -> Option<&ExperimentRecord> {
        self.experiments.get(experiment_id)
    }

    /// Append rows, skipping IDs that are already stored.
    ///
    /// Returns the number of rows added.
    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = ExperimentRow>) -> usize {
        let before = self.rows.len();
        for row in rows {
            if !self.rows.iter().any(|r| r.row_id == row.row_id) {
                self.rows.push(row);
            }
        }
        self.rows.len() - before
    }

    /// All rows in creation order.
    #[must_use]
    pub fn rows(&self) -> &[ExperimentRow] {
        &self.rows
    }

    /// Rows without a successful run.
    #[must_use]
    pub fn pending_rows(&self) -> Vec<&ExperimentRow> {
        self.rows
            .iter()
            .filter(|row| {
                self.runs
                    .get(&row.row_id)
                    .map_or(true, |run| run.status() != super::RunStatus::Success)
            })
            .collect()
    }

    /// Add or replace a run.
    pub fn add_run(&mut self, run: RunRecord) {
        self.runs.insert(run.run_id().to_string(), run);
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get all runs for an experiment.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: &str) -> Vec<&RunRecord> {
        self.runs
            .values()
            .filter(|run| run.experiment_id() == experiment_id)
            .collect()
    }

    /// Add curve points.
    pub fn add_points(&mut self, points: impl IntoIterator<Item = CurvePoint>) {
        self.points.extend(points);
    }

    /// All curve points.
    #[must_use]
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Get one learning curve, ordered by anchor.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use lcdb::curvedb::SplitName;
    /// use lcdb::experiment::{CurvePoint, ExperimentStore};
    ///
    /// let mut store = ExperimentStore::new();
    /// for anchor in [64, 16, 32] {
    ///     store.add_points([CurvePoint::new("run-1", SplitName::Val, anchor, "accuracy", 0.5)]);
    /// }
    ///
    /// let curve = store.get_curve("run-1", SplitName::Val, "accuracy");
    /// let anchors: Vec<u64> = curve.iter().map(CurvePoint::anchor).collect();
    /// assert_eq!(anchors, vec![16, 32, 64]);
    /// ```
    #[must_use]
    pub fn get_curve(&self, run_id: &str, split: SplitName, metric: &str) -> Vec<CurvePoint> {
        let mut points: Vec<CurvePoint> = self
            .points
            .iter()
            .filter(|p| p.run_id() == run_id && p.split() == split && p.metric() == metric)
            .cloned()
            .collect();

        points.sort_by_key(CurvePoint::anchor);

        points
    }

    /// Write the store as JSON.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a store written by [`ExperimentStore::save_json`].
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Load a store, or start an empty one if the file does not exist.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be parsed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_json(path)
        } else {
            Ok(Self::new())
        }
    }
}
