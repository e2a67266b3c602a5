//! Experiment tracking schema
//!
//! `create` turns a workflow's configuration space into rows; `run`
//! executes rows and tracks each execution as a run.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< ExperimentRow (N) ── RunRecord (0..1)
//!                                                    │
//!                                                    └──< CurvePoint (N) [split, anchor, metric]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use lcdb::curvedb::{Objective, SplitName};
//! use lcdb::experiment::{CurvePoint, RunRecord, RunStatus};
//!
//! // Start a run of one experiment row
//! let mut run = RunRecord::new("exp-001-c0000-t0-v0", "exp-001");
//! run.start();
//!
//! // Record a curve point
//! let point = CurvePoint::new(run.run_id(), SplitName::Val, 16, "accuracy", 0.5);
//!
//! // Complete the run
//! run.succeed(Some(Objective::Score(point.value())), None);
//! assert_eq!(run.status(), RunStatus::Success);
//! ```

mod curve_point;
mod experiment_record;
mod row;
mod run_record;
mod store;

pub use curve_point::CurvePoint;
pub use experiment_record::ExperimentRecord;
pub use row::{create_experiments, ExperimentPlan, ExperimentRow};
pub use run_record::{RunRecord, RunStatus};
pub use store::ExperimentStore;
