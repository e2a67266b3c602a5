//! Baseline workflows: majority class and nearest centroid

use super::preprocess::{Preprocessor, Scaler};
use super::space::{ConfigSpace, Hyperparameter};
use super::{parse_hyperparameters, FitInput, Hyperparameters, Workflow, WorkflowEntry, WorkflowInfos};
use crate::data::{unique_labels, Label, Matrix};
use crate::error::WorkflowError;
use crate::timer::Timer;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

/// Predicts the most frequent training label; probabilities are the class frequencies
#[derive(Debug, Clone, Default)]
pub struct MajorityClassWorkflow {
    infos: WorkflowInfos,
    prior: Option<Vec<f64>>,
}

impl MajorityClassWorkflow {
    /// Registry name
    pub const NAME: &'static str = "majority";

    /// Create an unfitted instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry entry
    #[must_use]
    pub fn entry() -> WorkflowEntry {
        WorkflowEntry::new(
            |_| Ok(Box::new(Self::new()) as Box<dyn Workflow>),
            || ConfigSpace::new(Self::NAME),
        )
    }

    fn prior(&self) -> Result<&[f64], WorkflowError> {
        self.prior.as_deref().ok_or(WorkflowError::NotFitted)
    }
}

impl Workflow for MajorityClassWorkflow {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fit(&mut self, input: &FitInput, _timer: &Timer) -> Result<(), WorkflowError> {
        if input.y_train.is_empty() {
            return Err(WorkflowError::Failed(anyhow::anyhow!("cannot fit on an empty training set")));
        }
        let classes = unique_labels(&input.y_train);
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for label in &input.y_train {
            *counts.entry(label.as_str()).or_default() += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let total = input.y_train.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let prior = classes
            .iter()
            .map(|c| counts.get(c.as_str()).copied().unwrap_or(0) as f64 / total)
            .collect();
        self.prior = Some(prior);
        self.infos.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<Label>, WorkflowError> {
        let prior = self.prior()?;
        // ties go to the smallest label
        let best = argmax(prior);
        Ok(vec![self.infos.classes[best].clone(); x.rows()])
    }

    fn predict_proba(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        let prior = self.prior()?;
        let data = prior.iter().copied().cycle().take(x.rows() * prior.len()).collect();
        Matrix::new(x.rows(), prior.len(), data).map_err(|e| WorkflowError::Failed(e.into()))
    }

    fn infos(&self) -> &WorkflowInfos {
        &self.infos
    }
}

/// Distance used by [`NearestCentroidWorkflow`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L2 distance
    #[default]
    Euclidean,
    /// L1 distance
    Manhattan,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct CentroidConfig {
    metric: Metric,
    scaler: Scaler,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Euclidean,
            scaler: Scaler::Standardize,
        }
    }
}

#[derive(Debug, Clone)]
struct CentroidModel {
    preprocessor: Preprocessor,
    centroids: Vec<Vec<f64>>,
}

/// Assigns each instance to the class with the closest mean
///
/// Probabilities are a softmax over negative distances.
#[derive(Debug, Clone)]
pub struct NearestCentroidWorkflow {
    config: CentroidConfig,
    infos: WorkflowInfos,
    model: Option<CentroidModel>,
}

impl NearestCentroidWorkflow {
    /// Registry name
    pub const NAME: &'static str = "nearest_centroid";

    /// Create an unfitted instance
    #[must_use]
    pub fn new(metric: Metric, scaler: Scaler) -> Self {
        Self {
            config: CentroidConfig { metric, scaler },
            infos: WorkflowInfos::default(),
            model: None,
        }
    }

    /// Configuration space
    #[must_use]
    pub fn config_space() -> ConfigSpace {
        ConfigSpace::new(Self::NAME)
            .with(Hyperparameter::categorical("metric", &["euclidean", "manhattan"], "euclidean"))
            .with(Hyperparameter::categorical("scaler", &["none", "standardize", "min_max"], "standardize"))
    }

    /// Registry entry
    #[must_use]
    pub fn entry() -> WorkflowEntry {
        WorkflowEntry::new(Self::build, Self::config_space)
    }

    fn build(hyperparameters: &Hyperparameters) -> crate::Result<Box<dyn Workflow>> {
        let config: CentroidConfig = parse_hyperparameters(hyperparameters)?;
        Ok(Box::new(Self::new(config.metric, config.scaler)))
    }

    fn distances(&self, model: &CentroidModel, row: &[f64]) -> Vec<f64> {
        model
            .centroids
            .iter()
            .map(|c| match self.config.metric {
                Metric::Euclidean => c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt(),
                Metric::Manhattan => c.iter().zip(row).map(|(a, b)| (a - b).abs()).sum(),
            })
            .collect()
    }
}

impl Workflow for NearestCentroidWorkflow {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fit(&mut self, input: &FitInput, _timer: &Timer) -> Result<(), WorkflowError> {
        if input.y_train.is_empty() {
            return Err(WorkflowError::Failed(anyhow::anyhow!("cannot fit on an empty training set")));
        }
        let preprocessor = Preprocessor::fit(&input.x_train, &input.metadata, self.config.scaler)?;
        let x = preprocessor.transform(&input.x_train)?;
        let classes = unique_labels(&input.y_train);
        let index: FxHashMap<&str, usize> =
            classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

        let mut sums = vec![vec![0.0; x.cols()]; classes.len()];
        let mut counts = vec![0usize; classes.len()];
        for (row, label) in x.iter_rows().zip(&input.y_train) {
            let k = index[label.as_str()];
            counts[k] += 1;
            for (s, v) in sums[k].iter_mut().zip(row) {
                *s += v;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let centroids = sums
            .into_iter()
            .zip(&counts)
            .map(|(s, &n)| s.into_iter().map(|v| v / n as f64).collect())
            .collect();

        self.model = Some(CentroidModel {
            preprocessor,
            centroids,
        });
        self.infos.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<Label>, WorkflowError> {
        let model = self.model.as_ref().ok_or(WorkflowError::NotFitted)?;
        let x = model.preprocessor.transform(x)?;
        Ok(x.iter_rows()
            .map(|row| {
                let d: Vec<f64> = self.distances(model, row).into_iter().map(|v| -v).collect();
                self.infos.classes[argmax(&d)].clone()
            })
            .collect())
    }

    fn predict_proba(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        let model = self.model.as_ref().ok_or(WorkflowError::NotFitted)?;
        let x = model.preprocessor.transform(x)?;
        let k = self.infos.classes.len();
        let mut data = Vec::with_capacity(x.rows() * k);
        for row in x.iter_rows() {
            let scores: Vec<f64> = self.distances(model, row).into_iter().map(|v| -v).collect();
            data.extend(softmax(&scores));
        }
        Matrix::new(x.rows(), k, data).map_err(|e| WorkflowError::Failed(e.into()))
    }

    fn infos(&self) -> &WorkflowInfos {
        &self.infos
    }

    fn fit_report(&self) -> Option<Value> {
        let model = self.model.as_ref()?;
        Some(serde_json::json!({
            "num_features": model.preprocessor.output_width(),
            "num_centroids": model.centroids.len(),
        }))
    }
}

/// Index of the largest value; the first one wins ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Numerically stable softmax
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}
