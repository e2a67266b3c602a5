//! Curve Point - one scalar metric of one anchor of one run

use crate::curvedb::{Report, SplitName};
use serde::{Deserialize, Serialize};

/// One learning-curve data point.
///
/// Points are the flat, columnar form of a report's curves:
/// - `run_id` + `split` + `metric` select a curve
/// - `anchor` orders the points of a curve
///
/// The confusion matrix is not a scalar and is not flattened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    run_id: String,
    split: SplitName,
    anchor: u64,
    metric: String,
    #[serde(with = "crate::curve::nan_as_null")]
    value: f64,
}

impl CurvePoint {
    /// Create a new curve point.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        split: SplitName,
        anchor: u64,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            split,
            anchor,
            metric: metric.into(),
            value,
        }
    }

    /// Flatten every scalar metric of a report.
    ///
    /// Points come out split by split, anchor by anchor.
    #[must_use]
    pub fn from_report(run_id: &str, report: &Report) -> Vec<Self> {
        let mut points = Vec::new();
        for split in SplitName::ALL {
            let curve = report.curve_db.curve(split);
            for &anchor in curve.anchors() {
                let Ok(record) = curve.get(anchor) else {
                    continue;
                };
                for (metric, value) in record.scalars() {
                    points.push(Self::new(run_id, split, anchor as u64, metric, value));
                }
            }
        }
        points
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the data split.
    #[must_use]
    pub const fn split(&self) -> SplitName {
        self.split
    }

    /// Get the anchor (training-set size).
    #[must_use]
    pub const fn anchor(&self) -> u64 {
        self.anchor
    }

    /// Get the metric name.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }
}
