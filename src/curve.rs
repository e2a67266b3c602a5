//! Per-split learning curves
//!
//! A [`Curve`] maps anchors to [`MetricRecord`]s for one data split
//! (train, val or test). Anchors keep insertion order, which is increasing
//! because the controller walks the schedule in order.

use crate::data::Label;
use crate::data::Matrix;
use crate::timer::Timer;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before the log
const LOG_LOSS_EPS: f64 = 1e-15;

/// Predicted class probabilities with their column order
#[derive(Debug, Clone, Copy)]
pub struct Probabilities<'a> {
    /// Class of each column, as reported by the workflow
    pub classes: &'a [Label],
    /// One row per instance, one column per class
    pub values: &'a Matrix,
}

/// Metrics of one anchor on one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Fraction of correct predictions (NaN on an empty split)
    #[serde(with = "nan_as_null")]
    pub accuracy: f64,
    /// Mean per-class recall over the classes present in `y_true`
    #[serde(with = "nan_as_null")]
    pub balanced_accuracy: f64,
    /// Rows are true labels, columns predicted labels, both in the curve's label order
    pub confusion_matrix: Vec<Vec<u64>>,
    /// Cross-entropy of the predicted probabilities
    pub log_loss: Option<f64>,
    /// Brier score (positive-class form for binary tasks)
    pub brier_score: Option<f64>,
}

impl MetricRecord {
    /// Metric names in the order they are logged
    pub const NAMES: [&'static str; 5] = [
        "accuracy",
        "balanced_accuracy",
        "confusion_matrix",
        "log_loss",
        "brier_score",
    ];

    /// Look a metric up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "accuracy" => Some(json!(self.accuracy)),
            "balanced_accuracy" => Some(json!(self.balanced_accuracy)),
            "confusion_matrix" => Some(json!(self.confusion_matrix)),
            "log_loss" => self.log_loss.map(|v| json!(v)),
            "brier_score" => self.brier_score.map(|v| json!(v)),
            _ => None,
        }
    }

    /// Scalar metrics only (the confusion matrix is skipped)
    #[must_use]
    pub fn scalars(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            ("accuracy", self.accuracy),
            ("balanced_accuracy", self.balanced_accuracy),
        ];
        if let Some(v) = self.log_loss {
            out.push(("log_loss", v));
        }
        if let Some(v) = self.brier_score {
            out.push(("brier_score", v));
        }
        out
    }
}

/// Ordered anchor -> metrics mapping for one split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curve {
    labels: Vec<Label>,
    anchors: Vec<usize>,
    records: BTreeMap<usize, MetricRecord>,
    #[serde(skip)]
    timer: Option<Timer>,
}

impl PartialEq for Curve {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels && self.anchors == other.anchors && self.records == other.records
    }
}

impl Curve {
    /// Create an empty curve over a fixed label order
    #[must_use]
    pub fn new(labels: Vec<Label>) -> Self {
        Self {
            labels,
            ..Self::default()
        }
    }

    /// Create an empty curve that also logs every metric into `timer`
    #[must_use]
    pub fn with_timer(labels: Vec<Label>, timer: Timer) -> Self {
        Self {
            labels,
            timer: Some(timer),
            ..Self::default()
        }
    }

    /// Anchors in insertion order
    #[must_use]
    pub fn anchors(&self) -> &[usize] {
        &self.anchors
    }

    /// Label order of the confusion matrices
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of scored anchors
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Check if no anchor has been scored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Metrics of an anchor
    ///
    /// # Errors
    /// Returns `AnchorNotFound` if the anchor was never scored
    pub fn get(&self, anchor: usize) -> Result<&MetricRecord> {
        self.records.get(&anchor).ok_or(Error::AnchorNotFound(anchor))
    }

    /// Record of the most recent anchor
    #[must_use]
    pub fn last(&self) -> Option<(usize, &MetricRecord)> {
        let anchor = *self.anchors.last()?;
        self.records.get(&anchor).map(|r| (anchor, r))
    }

    /// `(anchor, value)` pairs of a scalar metric, in anchor order
    #[must_use]
    pub fn values(&self, metric: &str) -> Vec<(usize, f64)> {
        self.anchors
            .iter()
            .filter_map(|a| {
                let record = self.records.get(a)?;
                record.get(metric)?.as_f64().map(|v| (*a, v))
            })
            .collect()
    }

    /// Compute and store the metrics of `anchor`
    ///
    /// Recomputing an existing anchor overwrites its record.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if predictions or probabilities do not line up with `y_true`
    pub fn compute_metrics(
        &mut self,
        anchor: usize,
        y_true: &[Label],
        y_pred: &[Label],
        y_pred_proba: Option<Probabilities<'_>>,
    ) -> Result<&MetricRecord> {
        if y_true.len() != y_pred.len() {
            return Err(Error::ShapeMismatch {
                context: "y_pred".to_string(),
                expected: y_true.len(),
                actual: y_pred.len(),
            });
        }
        if let Some(proba) = y_pred_proba {
            if proba.values.rows() != y_true.len() {
                return Err(Error::ShapeMismatch {
                    context: "y_pred_proba rows".to_string(),
                    expected: y_true.len(),
                    actual: proba.values.rows(),
                });
            }
            if proba.values.cols() != proba.classes.len() {
                return Err(Error::ShapeMismatch {
                    context: "y_pred_proba columns".to_string(),
                    expected: proba.classes.len(),
                    actual: proba.values.cols(),
                });
            }
        }

        self.extend_labels(y_true.iter().chain(y_pred));
        let confusion_matrix = self.confusion_matrix(y_true, y_pred);
        let record = MetricRecord {
            accuracy: accuracy(y_true, y_pred),
            balanced_accuracy: balanced_accuracy(&confusion_matrix),
            confusion_matrix,
            log_loss: y_pred_proba.map(|p| log_loss(y_true, p)),
            brier_score: y_pred_proba.map(|p| brier_score(y_true, p, &self.labels)),
        };

        if let Some(timer) = &self.timer {
            for name in MetricRecord::NAMES {
                if let Some(value) = record.get(name) {
                    timer.log(name, value);
                }
            }
        }

        if !self.records.contains_key(&anchor) {
            self.anchors.push(anchor);
        }
        self.records.insert(anchor, record);
        Ok(&self.records[&anchor])
    }

    fn extend_labels<'a>(&mut self, seen: impl Iterator<Item = &'a Label>) {
        let mut added = false;
        for label in seen {
            if !self.labels.contains(label) {
                self.labels.push(label.clone());
                added = true;
            }
        }
        if added {
            self.labels.sort_unstable();
        }
    }

    fn confusion_matrix(&self, y_true: &[Label], y_pred: &[Label]) -> Vec<Vec<u64>> {
        let index: FxHashMap<&str, usize> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let k = self.labels.len();
        let mut matrix = vec![vec![0u64; k]; k];
        for (t, p) in y_true.iter().zip(y_pred) {
            if let (Some(&i), Some(&j)) = (index.get(t.as_str()), index.get(p.as_str())) {
                matrix[i][j] += 1;
            }
        }
        matrix
    }
}

/// JSON has no NaN; store it as `null` and read `null` back as NaN
pub(crate) mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[allow(clippy::cast_precision_loss)]
fn accuracy(y_true: &[Label], y_pred: &[Label]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn balanced_accuracy(confusion_matrix: &[Vec<u64>]) -> f64 {
    let recalls: Vec<f64> = confusion_matrix
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let support: u64 = row.iter().sum();
            (support > 0).then(|| row[i] as f64 / support as f64)
        })
        .collect();
    if recalls.is_empty() {
        return f64::NAN;
    }
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

fn class_index(classes: &[Label]) -> FxHashMap<&str, usize> {
    classes
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn log_loss(y_true: &[Label], proba: Probabilities<'_>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let index = class_index(proba.classes);
    let total: f64 = y_true
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let p = index
                .get(t.as_str())
                .map_or(0.0, |&c| proba.values.get(i, c));
            -p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS).ln()
        })
        .sum();
    total / y_true.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn brier_score(y_true: &[Label], proba: Probabilities<'_>, labels: &[Label]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let index = class_index(proba.classes);
    let prob = |row: usize, label: &str| index.get(label).map_or(0.0, |&c| proba.values.get(row, c));

    let total: f64 = if labels.len() == 2 {
        let positive = labels[1].as_str();
        y_true
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let target = if t == positive { 1.0 } else { 0.0 };
                (prob(i, positive) - target).powi(2)
            })
            .sum()
    } else {
        y_true
            .iter()
            .enumerate()
            .map(|(i, t)| {
                labels
                    .iter()
                    .map(|l| {
                        let target = if l == t { 1.0 } else { 0.0 };
                        (prob(i, l) - target).powi(2)
                    })
                    .sum::<f64>()
            })
            .sum()
    };
    total / y_true.len() as f64
}
