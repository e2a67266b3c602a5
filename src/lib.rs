//! # LCDB: Learning-Curve Database
//!
//! **Version**: 0.1.0
//!
//! LCDB benchmarks classification workflows across growing training-set
//! sizes ("anchors"). For every anchor a fresh workflow is fitted on a
//! subsample of the training partition and scored on train, validation and
//! test, producing three learning curves per run. Every step is recorded in
//! a hierarchical timer tree that is persisted with the curves.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: The first failing anchor stops the run; scored anchors are kept
//! - **Poka-Yoke**: Fits run under an optional wall-clock budget
//! - **Genchi Genbutsu**: Every fit, prediction and metric is timed in the report
//! - **Heijunka**: Experiment rows share nothing and run in parallel
//!
//! ## Example Usage
//!
//! ```rust
//! use lcdb::controller::{ControllerConfig, LcController};
//! use lcdb::data::{Dataset, Matrix};
//! use lcdb::timer::Timer;
//! use lcdb::workflow::{factory, MajorityClassWorkflow};
//!
//! let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i)]).collect();
//! let labels = (0..100).map(|i| if i % 2 == 0 { "even" } else { "odd" }.to_string()).collect();
//! let dataset = Dataset::new(Matrix::from_rows(&rows)?, labels)?;
//!
//! let mut controller = LcController::new(
//!     Timer::new(),
//!     factory(MajorityClassWorkflow::new),
//!     &dataset,
//!     ControllerConfig::default(),
//! )?;
//! controller.build_curves()?;
//!
//! let report = controller.into_report();
//! assert_eq!(report.anchors, vec![16, 32, 64, 80]);
//! # Ok::<(), lcdb::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod anchor;
pub mod config;
pub mod controller;
pub mod curve;
pub mod curvedb;
pub mod data;
pub mod error;
pub mod experiment;
pub mod runner;
pub mod storage;
pub mod timer;
pub mod workflow;

pub use controller::{ControllerConfig, LcController};
pub use curvedb::{CurveDB, Objective, Report, SplitName};
pub use error::{Error, Result, WorkflowError};
