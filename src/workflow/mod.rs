//! Workflows: the models being benchmarked
//!
//! A workflow is anything that can be fitted on an anchor's training
//! subsample and then predict labels and class probabilities. The
//! controller builds a fresh instance for every anchor through a
//! [`WorkflowFactory`], so no fit state leaks between anchors.
//!
//! Workflows are looked up by name in an explicit [`WorkflowRegistry`]
//! populated at startup; nothing is discovered at runtime.

pub mod baseline;
pub mod preprocess;
pub mod softmax;
pub mod space;

pub use baseline::{MajorityClassWorkflow, NearestCentroidWorkflow};
pub use softmax::SoftmaxRegressionWorkflow;
pub use space::{Condition, ConfigSpace, Hyperparameter};

use crate::data::{DatasetMetadata, Label, Matrix};
use crate::error::WorkflowError;
use crate::timer::Timer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hyperparameter configuration, keyed by hyperparameter name
pub type Hyperparameters = Map<String, Value>;

/// Which optional inputs a workflow's fit needs besides the training data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitRequirements {
    /// Pass the validation partition
    pub valid: bool,
    /// Pass the test partition
    pub test: bool,
}

/// A held-out partition shared with the fit
#[derive(Debug, Clone)]
pub struct Holdout {
    /// Features
    pub x: Arc<Matrix>,
    /// Labels
    pub y: Arc<[Label]>,
}

/// Cancellation flag shared between the controller and a running fit
///
/// The controller cancels a fit whose wall-clock budget expired. Iterative
/// workflows poll [`CancelToken::check`] between iterations and stop early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Token that is not cancelled yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Stop point for fit loops
    ///
    /// # Errors
    /// Returns `Cancelled` once the token is cancelled
    pub fn check(&self) -> std::result::Result<(), WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        Ok(())
    }
}

/// Everything a fit call receives
///
/// The struct owns (or shares) its data so a fit can run on a worker thread.
#[derive(Debug, Clone)]
pub struct FitInput {
    /// Anchor training features
    pub x_train: Matrix,
    /// Anchor training labels
    pub y_train: Vec<Label>,
    /// Validation partition, when [`FitRequirements::valid`] is set
    pub valid: Option<Holdout>,
    /// Test partition, when [`FitRequirements::test`] is set
    pub test: Option<Holdout>,
    /// Dataset metadata (categorical columns and vocabulary)
    pub metadata: Arc<DatasetMetadata>,
    /// Cancelled when the fit runs out of time
    pub cancel: CancelToken,
}

/// Descriptive information a fitted workflow exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInfos {
    /// Class order of the `predict_proba` columns
    pub classes: Vec<Label>,
    /// Anything else the workflow wants to report
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The fit/predict capability set benchmarked by the controller
pub trait Workflow: Send {
    /// Registry name of the workflow
    fn name(&self) -> &str;

    /// Optional inputs the fit needs
    fn requirements(&self) -> FitRequirements {
        FitRequirements::default()
    }

    /// Fit on an anchor
    ///
    /// `timer` is rooted at a `fit` node; iterative workflows open
    /// `epoch_train` / `epoch` / `epoch_test` scopes under it.
    ///
    /// # Errors
    /// Any failure; the controller records it and stops adding anchors
    fn fit(&mut self, input: &FitInput, timer: &Timer) -> std::result::Result<(), WorkflowError>;

    /// Predict labels
    ///
    /// # Errors
    /// Returns `NotFitted` before a successful fit
    fn predict(&self, x: &Matrix) -> std::result::Result<Vec<Label>, WorkflowError>;

    /// Predict class probabilities, columns ordered as `infos().classes`
    ///
    /// # Errors
    /// Returns `NotFitted` before a successful fit
    fn predict_proba(&self, x: &Matrix) -> std::result::Result<Matrix, WorkflowError>;

    /// Descriptive information, at least the class order
    fn infos(&self) -> &WorkflowInfos;

    /// Iteration-level data collected during the last fit
    fn fit_report(&self) -> Option<Value> {
        None
    }
}

/// Creates a fresh workflow instance on every call
pub type WorkflowFactory = Box<dyn Fn() -> Result<Box<dyn Workflow>> + Send + Sync>;

/// Wrap an infallible constructor into a [`WorkflowFactory`]
pub fn factory<W, F>(build: F) -> WorkflowFactory
where
    W: Workflow + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    Box::new(move || Ok(Box::new(build()) as Box<dyn Workflow>))
}

/// Builds a workflow from a hyperparameter configuration
pub type WorkflowBuilder = fn(&Hyperparameters) -> Result<Box<dyn Workflow>>;

/// Registry entry of one workflow
#[derive(Debug, Clone, Copy)]
pub struct WorkflowEntry {
    /// Constructor
    pub builder: WorkflowBuilder,
    /// Configuration space of the constructor's hyperparameters
    pub config_space: fn() -> ConfigSpace,
    /// Rejects configurations that are valid in the space but not worth running
    pub is_valid: fn(&Hyperparameters) -> bool,
}

impl WorkflowEntry {
    /// Entry accepting every configuration of its space
    #[must_use]
    pub fn new(builder: WorkflowBuilder, config_space: fn() -> ConfigSpace) -> Self {
        Self {
            builder,
            config_space,
            is_valid: |_| true,
        }
    }
}

/// Explicit name -> workflow mapping
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    entries: BTreeMap<String, WorkflowEntry>,
}

impl WorkflowRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the workflows shipped with the crate
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(MajorityClassWorkflow::NAME, MajorityClassWorkflow::entry());
        registry.register(NearestCentroidWorkflow::NAME, NearestCentroidWorkflow::entry());
        registry.register(SoftmaxRegressionWorkflow::NAME, SoftmaxRegressionWorkflow::entry());
        registry
    }

    /// Add or replace a workflow
    pub fn register(&mut self, name: impl Into<String>, entry: WorkflowEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Registry entry of a workflow
    ///
    /// # Errors
    /// Returns `UnknownWorkflow` if the name is not registered
    pub fn entry(&self, name: &str) -> Result<&WorkflowEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownWorkflow(name.to_string()))
    }

    /// Configuration space of a workflow
    ///
    /// # Errors
    /// Returns `UnknownWorkflow` if the name is not registered
    pub fn config_space(&self, name: &str) -> Result<ConfigSpace> {
        Ok((self.entry(name)?.config_space)())
    }

    /// Build one instance
    ///
    /// # Errors
    /// - `UnknownWorkflow` if the name is not registered
    /// - `InvalidHyperparameter` if the configuration is outside the space
    pub fn build(&self, name: &str, hyperparameters: &Hyperparameters) -> Result<Box<dyn Workflow>> {
        let entry = self.entry(name)?;
        (entry.config_space)().validate(hyperparameters)?;
        (entry.builder)(hyperparameters)
    }

    /// Factory producing fresh instances of one configuration
    ///
    /// # Errors
    /// Same as [`WorkflowRegistry::build`]; the configuration is validated once up front
    pub fn factory(&self, name: &str, hyperparameters: &Hyperparameters) -> Result<WorkflowFactory> {
        let entry = *self.entry(name)?;
        (entry.config_space)().validate(hyperparameters)?;
        let hyperparameters = hyperparameters.clone();
        Ok(Box::new(move || (entry.builder)(&hyperparameters)))
    }
}

/// Deserialize a workflow's typed configuration from its hyperparameter map
///
/// # Errors
/// Returns `InvalidHyperparameter` if a value has the wrong type
pub fn parse_hyperparameters<T: serde::de::DeserializeOwned>(hyperparameters: &Hyperparameters) -> Result<T> {
    serde_json::from_value(Value::Object(hyperparameters.clone()))
        .map_err(|e| Error::InvalidHyperparameter(e.to_string()))
}
