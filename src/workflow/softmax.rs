//! Multinomial logistic regression trained by full-batch gradient descent
//!
//! The only built-in iterative workflow. Each fit records its epochs in the
//! timer tree:
//!
//! ```text
//! fit ─ epoch_train ─ epoch {value: e} ─ loss {value}
//!                                      └ epoch_test ─ metrics ─ train | val | test ─ accuracy | log_loss
//! ```
//!
//! `epoch_test` is only recorded on evaluation epochs (1, 2, 4, 8, ... and
//! the last one), which is what `QueryEpochValues { with_epoch_test: true }`
//! selects.

use super::preprocess::{Preprocessor, Scaler};
use super::space::{ConfigSpace, Hyperparameter};
use super::{
    parse_hyperparameters, FitInput, FitRequirements, Hyperparameters, Workflow, WorkflowEntry,
    WorkflowInfos,
};
use crate::data::{unique_labels, Label, Matrix};
use crate::error::WorkflowError;
use crate::timer::Timer;
use crate::workflow::baseline::{argmax, softmax};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct SoftmaxConfig {
    learning_rate: f64,
    epochs: usize,
    l2: f64,
    scaler: Scaler,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 20,
            l2: 1e-4,
            scaler: Scaler::Standardize,
        }
    }
}

#[derive(Debug, Clone)]
struct SoftmaxModel {
    preprocessor: Preprocessor,
    // (features + 1) x classes, bias in the last row
    weights: Matrix,
}

/// Epoch-level record of the last fit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// Training loss after every epoch
    pub train_loss: Vec<f64>,
    /// Evaluation epochs (1-based)
    pub eval_epochs: Vec<usize>,
    /// Training accuracy at the evaluation epochs
    pub train_accuracy: Vec<f64>,
    /// Validation accuracy at the evaluation epochs, when a validation set was given
    pub val_accuracy: Vec<f64>,
    /// Test accuracy at the evaluation epochs, when a test set was given
    pub test_accuracy: Vec<f64>,
}

/// Softmax regression workflow
#[derive(Debug, Clone)]
pub struct SoftmaxRegressionWorkflow {
    config: SoftmaxConfig,
    infos: WorkflowInfos,
    model: Option<SoftmaxModel>,
    report: Option<EpochReport>,
}

impl SoftmaxRegressionWorkflow {
    /// Registry name
    pub const NAME: &'static str = "softmax_regression";

    /// Create an unfitted instance
    #[must_use]
    pub fn new(learning_rate: f64, epochs: usize, l2: f64, scaler: Scaler) -> Self {
        Self {
            config: SoftmaxConfig {
                learning_rate,
                epochs,
                l2,
                scaler,
            },
            infos: WorkflowInfos::default(),
            model: None,
            report: None,
        }
    }

    /// Configuration space
    #[must_use]
    pub fn config_space() -> ConfigSpace {
        ConfigSpace::new(Self::NAME)
            .with(Hyperparameter::log_float("learning_rate", 1e-3, 1.0, 0.1))
            .with(Hyperparameter::integer("epochs", 1, 200, 20, true))
            .with(Hyperparameter::log_float("l2", 1e-8, 1e-1, 1e-4))
            .with(Hyperparameter::categorical("scaler", &["none", "standardize", "min_max"], "standardize"))
    }

    /// Registry entry
    ///
    /// Unscaled features with a large step diverge, so that combination is filtered out.
    #[must_use]
    pub fn entry() -> WorkflowEntry {
        WorkflowEntry {
            is_valid: |hp| {
                let unscaled = hp.get("scaler").is_some_and(|s| s == "none");
                let step = hp.get("learning_rate").and_then(Value::as_f64).unwrap_or(0.1);
                !(unscaled && step > 0.5)
            },
            ..WorkflowEntry::new(Self::build, Self::config_space)
        }
    }

    fn build(hyperparameters: &Hyperparameters) -> crate::Result<Box<dyn Workflow>> {
        let c: SoftmaxConfig = parse_hyperparameters(hyperparameters)?;
        Ok(Box::new(Self::new(c.learning_rate, c.epochs, c.l2, c.scaler)))
    }

    /// Epoch-level record of the last fit
    #[must_use]
    pub fn epoch_report(&self) -> Option<&EpochReport> {
        self.report.as_ref()
    }
}

fn is_eval_epoch(epoch: usize, last: usize) -> bool {
    epoch == last || epoch.is_power_of_two()
}

/// Row-wise class probabilities of `x` (already preprocessed)
fn probabilities(weights: &Matrix, x: &Matrix) -> Matrix {
    let d = x.cols();
    let k = weights.cols();
    let mut out = Matrix::zeros(x.rows(), k);
    for (i, row) in x.iter_rows().enumerate() {
        let logits: Vec<f64> = (0..k)
            .map(|c| weights.get(d, c) + row.iter().enumerate().map(|(j, v)| v * weights.get(j, c)).sum::<f64>())
            .collect();
        for (c, p) in softmax(&logits).into_iter().enumerate() {
            out.set(i, c, p);
        }
    }
    out
}

struct Scored {
    accuracy: f64,
    log_loss: f64,
}

#[allow(clippy::cast_precision_loss)]
fn score(proba: &Matrix, y: &[Label], classes: &[Label]) -> Scored {
    if y.is_empty() {
        return Scored {
            accuracy: f64::NAN,
            log_loss: f64::NAN,
        };
    }
    let mut correct = 0usize;
    let mut loss = 0.0;
    for (i, label) in y.iter().enumerate() {
        let row = proba.row(i);
        if classes[argmax(row)] == *label {
            correct += 1;
        }
        let p = classes
            .iter()
            .position(|c| c == label)
            .map_or(EPS, |c| row[c].clamp(EPS, 1.0 - EPS));
        loss -= p.ln();
    }
    let n = y.len() as f64;
    Scored {
        accuracy: correct as f64 / n,
        log_loss: loss / n,
    }
}

impl Workflow for SoftmaxRegressionWorkflow {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> FitRequirements {
        FitRequirements {
            valid: true,
            test: true,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, input: &FitInput, timer: &Timer) -> Result<(), WorkflowError> {
        if input.y_train.is_empty() {
            return Err(WorkflowError::Failed(anyhow::anyhow!("cannot fit on an empty training set")));
        }
        let preprocessor = Preprocessor::fit(&input.x_train, &input.metadata, self.config.scaler)?;
        let x = preprocessor.transform(&input.x_train)?;
        let classes = unique_labels(&input.y_train);
        let index: FxHashMap<&str, usize> =
            classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
        let targets: Vec<usize> = input.y_train.iter().map(|l| index[l.as_str()]).collect();

        let holdouts = [("val", &input.valid), ("test", &input.test)]
            .into_iter()
            .filter_map(|(name, holdout)| holdout.as_ref().map(|h| (name, h)))
            .map(|(name, h)| Ok((name, preprocessor.transform(&h.x)?, h.y.clone())))
            .collect::<Result<Vec<_>, WorkflowError>>()?;

        let (n, d, k) = (x.rows(), x.cols(), classes.len());
        let mut weights = Matrix::zeros(d + 1, k);
        let mut report = EpochReport::default();
        let lr = self.config.learning_rate;
        let l2 = self.config.l2;

        let _epoch_train = timer.time("epoch_train", Value::Null);
        for epoch in 1..=self.config.epochs {
            if let Err(err) = input.cancel.check() {
                self.report = Some(report);
                return Err(err);
            }
            let _epoch = timer.time("epoch", json!({ "value": epoch }));

            let proba = probabilities(&weights, &x);
            let mut grad = Matrix::zeros(d + 1, k);
            let mut loss = 0.0;
            for (i, row) in x.iter_rows().enumerate() {
                let target = targets[i];
                loss -= proba.get(i, target).max(EPS).ln();
                for c in 0..k {
                    let err = proba.get(i, c) - if c == target { 1.0 } else { 0.0 };
                    for (j, v) in row.iter().enumerate() {
                        grad.set(j, c, grad.get(j, c) + err * v);
                    }
                    grad.set(d, c, grad.get(d, c) + err);
                }
            }
            let w = &weights;
            let penalty: f64 = (0..d)
                .flat_map(|j| (0..k).map(move |c| w.get(j, c).powi(2)))
                .sum();
            let loss = loss / n as f64 + 0.5 * l2 * penalty;
            if !loss.is_finite() {
                // epochs trained so far stay available through fit_report
                self.report = Some(report);
                return Err(WorkflowError::Failed(anyhow::anyhow!("training diverged at epoch {epoch}")));
            }
            for j in 0..=d {
                for c in 0..k {
                    let reg = if j < d { l2 * weights.get(j, c) } else { 0.0 };
                    let w = weights.get(j, c) - lr * (grad.get(j, c) / n as f64 + reg);
                    weights.set(j, c, w);
                }
            }
            timer.log("loss", json!(loss));
            report.train_loss.push(loss);

            if is_eval_epoch(epoch, self.config.epochs) {
                report.eval_epochs.push(epoch);
                let _epoch_test = timer.time("epoch_test", Value::Null);
                let _metrics = timer.time("metrics", Value::Null);
                let train = score(&probabilities(&weights, &x), &input.y_train, &classes);
                {
                    let _split = timer.time("train", Value::Null);
                    timer.log("accuracy", json!(train.accuracy));
                    timer.log("log_loss", json!(train.log_loss));
                }
                report.train_accuracy.push(train.accuracy);
                for (name, hx, hy) in &holdouts {
                    let scored = score(&probabilities(&weights, hx), hy, &classes);
                    let _split = timer.time(name, Value::Null);
                    timer.log("accuracy", json!(scored.accuracy));
                    timer.log("log_loss", json!(scored.log_loss));
                    match *name {
                        "val" => report.val_accuracy.push(scored.accuracy),
                        _ => report.test_accuracy.push(scored.accuracy),
                    }
                }
            }
        }

        self.model = Some(SoftmaxModel {
            preprocessor,
            weights,
        });
        self.infos.classes = classes;
        self.report = Some(report);
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<Label>, WorkflowError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .iter_rows()
            .map(|row| self.infos.classes[argmax(row)].clone())
            .collect())
    }

    fn predict_proba(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        let model = self.model.as_ref().ok_or(WorkflowError::NotFitted)?;
        let x = model.preprocessor.transform(x)?;
        Ok(probabilities(&model.weights, &x))
    }

    fn infos(&self) -> &WorkflowInfos {
        &self.infos
    }

    fn fit_report(&self) -> Option<Value> {
        self.report
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
    }
}
