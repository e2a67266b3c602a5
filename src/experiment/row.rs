//! Experiment rows and their creation
//!
//! A row is everything needed to run one controller: dataset, workflow,
//! hyperparameters, seeds, split settings and the anchor rule.
//! Hyperparameters and the resulting anchors are stored JSON-encoded so
//! rows stay flat.

use crate::anchor::AnchorSchedule;
use crate::controller::ControllerConfig;
use crate::data::split::SplitConfig;
use crate::workflow::{Hyperparameters, WorkflowRegistry};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// One (workflow configuration, seed pair) to evaluate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRow {
    /// Unique row identifier, also used as run ID
    pub row_id: String,
    /// Parent experiment
    pub experiment_id: String,
    /// Registry name of the workflow
    pub workflow: String,
    /// Dataset identifier (file path of the Parquet table)
    pub dataset: String,
    /// Seed of the test draw
    pub test_seed: u64,
    /// Seed of the validation draw
    pub valid_seed: u64,
    /// Test proportion
    pub test_prop: f64,
    /// Validation proportion
    pub valid_prop: f64,
    /// Stratified split
    pub stratify: bool,
    /// Nested anchors
    pub monotonic: bool,
    /// Fit budget in seconds
    pub timeout_on_fit: Option<f64>,
    /// JSON-encoded hyperparameter configuration
    pub hyperparameters: String,
    /// Rule the anchors are generated with
    #[serde(default)]
    pub schedule: AnchorSchedule,
    /// JSON-encoded anchors the rule gave at creation time
    pub train_sizes: String,
}

impl ExperimentRow {
    /// Decode the hyperparameter configuration
    ///
    /// # Errors
    /// Returns `Json` if the stored text is not a JSON object
    pub fn hyperparameters(&self) -> Result<Hyperparameters> {
        Ok(serde_json::from_str(&self.hyperparameters)?)
    }

    /// Decode the anchor schedule recorded at creation time
    ///
    /// # Errors
    /// Returns `Json` if the stored text is not a JSON integer array
    pub fn train_sizes(&self) -> Result<Vec<usize>> {
        Ok(serde_json::from_str(&self.train_sizes)?)
    }

    /// Controller settings of this row
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a negative or non-finite timeout
    pub fn controller_config(&self) -> Result<ControllerConfig> {
        let mut config = ControllerConfig::default()
            .with_seeds(self.test_seed, self.valid_seed)
            .with_props(self.valid_prop, self.test_prop)
            .with_stratify(self.stratify)
            .with_monotonic(self.monotonic)
            .with_schedule(self.schedule);
        if let Some(seconds) = self.timeout_on_fit {
            let timeout = Duration::try_from_secs_f64(seconds).map_err(|e| {
                Error::InvalidConfig(format!("invalid fit timeout {seconds}: {e}"))
            })?;
            config = config.with_timeout(timeout);
        }
        Ok(config)
    }
}

/// Everything `create` needs to generate rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    /// Identifier of the experiment being created
    pub experiment_id: String,
    /// Registry name of the workflow
    pub workflow: String,
    /// Dataset identifier
    pub dataset: String,
    /// Number of instances of the dataset (fixes the anchor schedule)
    pub num_instances: usize,
    /// Number of hyperparameter configurations (the default one included)
    pub num_configs: usize,
    /// Seed of the configuration sampler
    pub config_seed: u64,
    /// Test seeds to cross with every configuration
    pub test_seeds: Vec<u64>,
    /// Validation seeds to cross with every configuration
    pub valid_seeds: Vec<u64>,
    /// Test proportion
    pub test_prop: f64,
    /// Validation proportion
    pub valid_prop: f64,
    /// Stratified split
    pub stratify: bool,
    /// Nested anchors
    pub monotonic: bool,
    /// Fit budget in seconds
    pub timeout_on_fit: Option<f64>,
    /// Anchor schedule rule
    pub schedule: AnchorSchedule,
}

/// Sample configurations and cross them with every seed pair
///
/// The default configuration comes first. Configurations rejected by the
/// workflow's validity check are dropped before crossing.
///
/// # Errors
/// - `UnknownWorkflow` if the workflow is not registered
/// - `InvalidSplit` / `InvalidConfig` for bad proportions or dataset size
pub fn create_experiments(registry: &WorkflowRegistry, plan: &ExperimentPlan) -> Result<Vec<ExperimentRow>> {
    let entry = registry.entry(&plan.workflow)?;
    let space = (entry.config_space)();
    space.check()?;

    let split = SplitConfig {
        test_prop: plan.test_prop,
        valid_prop: plan.valid_prop,
        stratify: plan.stratify,
        ..SplitConfig::default()
    };
    split.validate()?;
    let train_sizes = plan.schedule.anchors(split.train_size(plan.num_instances))?;
    let train_sizes = serde_json::to_string(&train_sizes)?;

    let sampled = space.sample(plan.num_configs, plan.config_seed);
    let total = sampled.len();
    let configs: Vec<(usize, Hyperparameters)> = sampled
        .into_iter()
        .enumerate()
        .filter(|(_, config)| (entry.is_valid)(config))
        .collect();
    info!(
        workflow = %plan.workflow,
        kept = configs.len(),
        rejected = total - configs.len(),
        "sampled configurations"
    );

    let mut rows = Vec::with_capacity(configs.len() * plan.test_seeds.len() * plan.valid_seeds.len());
    for (index, config) in &configs {
        let hyperparameters = serde_json::to_string(config)?;
        for &test_seed in &plan.test_seeds {
            for &valid_seed in &plan.valid_seeds {
                rows.push(ExperimentRow {
                    row_id: format!("{}-c{index:04}-t{test_seed}-v{valid_seed}", plan.experiment_id),
                    experiment_id: plan.experiment_id.clone(),
                    workflow: plan.workflow.clone(),
                    dataset: plan.dataset.clone(),
                    test_seed,
                    valid_seed,
                    test_prop: plan.test_prop,
                    valid_prop: plan.valid_prop,
                    stratify: plan.stratify,
                    monotonic: plan.monotonic,
                    timeout_on_fit: plan.timeout_on_fit,
                    hyperparameters: hyperparameters.clone(),
                    schedule: plan.schedule,
                    train_sizes: train_sizes.clone(),
                });
            }
        }
    }
    Ok(rows)
}
