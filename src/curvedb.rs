//! Final bundle of a learning-curve run
//!
//! A [`Report`] is created once per (workflow, seeds) evaluation and is not
//! mutated after the controller hands it out. It bundles the three curves
//! ([`CurveDB`]), auxiliary per-anchor data, the objective, the traceback
//! of the failure that stopped the run (if any) and the timer tree.

use crate::curve::Curve;
use crate::data::Label;
use crate::error::WorkflowError;
use crate::{Error, Result};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Data split a curve belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitName {
    /// Anchor training subsample
    Train,
    /// Validation partition
    Val,
    /// Test partition
    Test,
}

impl SplitName {
    /// All splits in report order
    pub const ALL: [Self; 3] = [Self::Train, Self::Val, Self::Test];

    /// Tag used in the timer tree and curve tables
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SplitName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "val" | "valid" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            other => Err(Error::InvalidConfig(format!("unknown split '{other}'"))),
        }
    }
}

/// Cause of a run that never scored an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Any other workflow failure
    Generic,
    /// Fit exceeded its wall-clock budget
    Timeout,
    /// Workflow ran out of memory
    Memory,
}

impl From<&WorkflowError> for FailureKind {
    fn from(err: &WorkflowError) -> Self {
        match err {
            WorkflowError::Timeout { .. } | WorkflowError::Cancelled => Self::Timeout,
            WorkflowError::OutOfMemory(_) => Self::Memory,
            _ => Self::Generic,
        }
    }
}

/// Summary value of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    /// Validation accuracy at the last scored anchor
    Score(f64),
    /// Failure sentinel; the run produced no usable curve
    Failure(FailureKind),
}

impl Objective {
    /// Sentinel string of a failure (`F`, `F_function_call_timeout_error`, `F_memory_error`)
    #[must_use]
    pub const fn sentinel(kind: FailureKind) -> &'static str {
        match kind {
            FailureKind::Generic => "F",
            FailureKind::Timeout => "F_function_call_timeout_error",
            FailureKind::Memory => "F_memory_error",
        }
    }

    /// Check if this is a failure sentinel
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Numeric score, if any
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Score(v) => Some(*v),
            Self::Failure(_) => None,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score(v) => write!(f, "{v}"),
            Self::Failure(kind) => f.write_str(Self::sentinel(*kind)),
        }
    }
}

impl Serialize for Objective {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Score(v) => serializer.serialize_f64(*v),
            Self::Failure(kind) => serializer.serialize_str(Self::sentinel(*kind)),
        }
    }
}

impl<'de> Deserialize<'de> for Objective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .map(Self::Score)
                .ok_or_else(|| de::Error::custom("objective is not a finite number")),
            // non-finite scores serialize as null
            Value::Null => Ok(Self::Score(f64::NAN)),
            Value::String(s) => match s.as_str() {
                "F" => Ok(Self::Failure(FailureKind::Generic)),
                "F_function_call_timeout_error" => Ok(Self::Failure(FailureKind::Timeout)),
                "F_memory_error" => Ok(Self::Failure(FailureKind::Memory)),
                other => Err(de::Error::custom(format!("unknown objective sentinel '{other}'"))),
            },
            other => Err(de::Error::custom(format!("invalid objective {other}"))),
        }
    }
}

/// Train/val/test curves plus per-anchor auxiliary data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveDB {
    /// Curve on the anchor training subsample
    pub train: Curve,
    /// Curve on the validation partition
    pub val: Curve,
    /// Curve on the test partition
    pub test: Curve,
    /// Workflow fit reports (e.g. epoch-wise sub-curves), keyed by anchor
    pub additional_data_per_anchor: BTreeMap<usize, Value>,
}

impl CurveDB {
    /// Bundle three curves
    #[must_use]
    pub fn new(
        train: Curve,
        val: Curve,
        test: Curve,
        additional_data_per_anchor: BTreeMap<usize, Value>,
    ) -> Self {
        Self {
            train,
            val,
            test,
            additional_data_per_anchor,
        }
    }

    /// Curve of one split
    #[must_use]
    pub const fn curve(&self, split: SplitName) -> &Curve {
        match split {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }

    /// Check if no anchor was scored on any split
    #[must_use]
    pub fn is_empty(&self) -> bool {
        SplitName::ALL.iter().all(|&s| self.curve(s).is_empty())
    }
}

/// Outcome of one learning-curve evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Validation proportion used for the split
    pub valid_prop: f64,
    /// Test proportion used for the split
    pub test_prop: f64,
    /// Whether anchor subsamples were nested prefixes
    pub monotonic: bool,
    /// Whether the split was stratified
    pub stratify: bool,
    /// Seed of the validation draw (and non-monotonic anchor shuffles)
    pub valid_seed: u64,
    /// Seed of the test draw
    pub test_seed: u64,
    /// Anchor schedule the run walked
    pub anchors: Vec<usize>,
    /// Latest validation accuracy, or a failure sentinel
    pub objective: Option<Objective>,
    /// Text of the failure that stopped the run
    pub traceback: Option<String>,
    /// Class order reported by the last fitted workflow
    pub labels: Vec<Label>,
    /// The three curves
    pub curve_db: CurveDB,
    /// Exported timer tree (see [`crate::timer`])
    pub timer: Value,
}

impl Report {
    /// Check if the run ended with a failure sentinel
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.objective.is_some_and(|o| o.is_failure())
    }

    /// Write the report as pretty JSON
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a report written by [`Report::save_json`]
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objective_serializes_as_number_or_sentinel() {
        assert_eq!(serde_json::to_value(Objective::Score(0.5)).unwrap(), json!(0.5));
        assert_eq!(
            serde_json::to_value(Objective::Failure(FailureKind::Memory)).unwrap(),
            json!("F_memory_error")
        );
        let parsed: Objective = serde_json::from_value(json!("F_function_call_timeout_error")).unwrap();
        assert_eq!(parsed, Objective::Failure(FailureKind::Timeout));
    }

    #[test]
    fn test_failure_kind_from_workflow_error() {
        assert_eq!(FailureKind::from(&WorkflowError::Timeout { seconds: 1.0 }), FailureKind::Timeout);
        assert_eq!(
            FailureKind::from(&WorkflowError::OutOfMemory("alloc".into())),
            FailureKind::Memory
        );
        assert_eq!(FailureKind::from(&WorkflowError::NotFitted), FailureKind::Generic);
    }

    #[test]
    fn test_split_name_round_trip() {
        for split in SplitName::ALL {
            assert_eq!(split.as_str().parse::<SplitName>().unwrap(), split);
        }
        assert!("holdout".parse::<SplitName>().is_err());
    }

    #[test]
    fn test_empty_curve_db() {
        assert!(CurveDB::default().is_empty());
    }
}
