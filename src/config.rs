//! Configuration file support
//!
//! An experiment campaign is described by one TOML file:
//!
//! ```toml
//! dataset = "data/iris.parquet"
//! target = "class"
//! workflow = "softmax_regression"
//! num_configs = 20
//! test_seeds = [0, 1]
//! valid_seeds = [0]
//! timeout_on_fit = 30.0
//! output_dir = "runs/iris"
//! parallel = true
//! ```
//!
//! Omitted keys take the defaults of [`LcdbConfig`]. Command-line flags
//! override file values.

use crate::anchor::AnchorSchedule;
use crate::data::split::SplitConfig;
use crate::experiment::ExperimentPlan;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_target() -> String {
    "class".to_string()
}

const fn default_num_configs() -> usize {
    10
}

fn default_seeds() -> Vec<u64> {
    vec![0]
}

const fn default_prop() -> f64 {
    0.1
}

const fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("lcdb-output")
}

/// Campaign configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LcdbConfig {
    /// Parquet dataset file
    pub dataset: PathBuf,
    /// Target column of the dataset
    #[serde(default = "default_target")]
    pub target: String,
    /// Registry name of the workflow
    pub workflow: String,
    /// Experiment identifier; derived from workflow and dataset when absent
    #[serde(default)]
    pub experiment_id: Option<String>,
    /// Number of hyperparameter configurations, the default one included
    #[serde(default = "default_num_configs")]
    pub num_configs: usize,
    /// Seed of the configuration sampler
    #[serde(default)]
    pub config_seed: u64,
    /// Test seeds
    #[serde(default = "default_seeds")]
    pub test_seeds: Vec<u64>,
    /// Validation seeds
    #[serde(default = "default_seeds")]
    pub valid_seeds: Vec<u64>,
    /// Validation proportion
    #[serde(default = "default_prop")]
    pub valid_prop: f64,
    /// Test proportion
    #[serde(default = "default_prop")]
    pub test_prop: f64,
    /// Stratified split
    #[serde(default = "default_true")]
    pub stratify: bool,
    /// Nested anchor subsamples
    #[serde(default)]
    pub monotonic: bool,
    /// Fit budget in seconds
    #[serde(default)]
    pub timeout_on_fit: Option<f64>,
    /// Anchor schedule rule
    #[serde(default)]
    pub schedule: AnchorSchedule,
    /// Directory receiving the experiment store, reports and curve table
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Run rows on the rayon pool
    #[serde(default)]
    pub parallel: bool,
}

impl LcdbConfig {
    /// Configuration with every optional key at its default
    #[must_use]
    pub fn new(dataset: impl Into<PathBuf>, workflow: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            target: default_target(),
            workflow: workflow.into(),
            experiment_id: None,
            num_configs: default_num_configs(),
            config_seed: 0,
            test_seeds: default_seeds(),
            valid_seeds: default_seeds(),
            valid_prop: default_prop(),
            test_prop: default_prop(),
            stratify: true,
            monotonic: false,
            timeout_on_fit: None,
            schedule: AnchorSchedule::default(),
            output_dir: default_output_dir(),
            parallel: false,
        }
    }

    /// Load and validate a TOML configuration file
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Toml` if it is not a valid configuration
    /// - `InvalidConfig` / `InvalidSplit` if a value is out of range
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Same as [`LcdbConfig::load`], minus I/O
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `InvalidConfig` or `InvalidSplit` naming the offending key
    pub fn validate(&self) -> Result<()> {
        if self.num_configs == 0 {
            return Err(Error::InvalidConfig("num_configs must be positive".to_string()));
        }
        if self.test_seeds.is_empty() || self.valid_seeds.is_empty() {
            return Err(Error::InvalidConfig(
                "test_seeds and valid_seeds must not be empty".to_string(),
            ));
        }
        if let Some(seconds) = self.timeout_on_fit {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "timeout_on_fit must be a positive number of seconds, got {seconds}"
                )));
            }
        }
        AnchorSchedule::new(self.schedule.min_anchor(), self.schedule.growth())?;
        SplitConfig {
            test_prop: self.test_prop,
            valid_prop: self.valid_prop,
            stratify: self.stratify,
            ..SplitConfig::default()
        }
        .validate()
    }

    /// Experiment identifier (explicit, or `<workflow>-<dataset stem>`)
    #[must_use]
    pub fn experiment_id(&self) -> String {
        self.experiment_id.clone().unwrap_or_else(|| {
            let stem = self
                .dataset
                .file_stem()
                .map_or_else(|| "dataset".to_string(), |s| s.to_string_lossy().into_owned());
            format!("{}-{stem}", self.workflow)
        })
    }

    /// Experiment store file inside the output directory
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.output_dir.join("experiments.json")
    }

    /// Parquet curve table inside the output directory
    #[must_use]
    pub fn curves_path(&self) -> PathBuf {
        self.output_dir.join("curves.parquet")
    }

    /// Directory receiving one report JSON per row
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    /// Row-creation plan for a dataset of `num_instances` rows
    #[must_use]
    pub fn plan(&self, num_instances: usize) -> ExperimentPlan {
        ExperimentPlan {
            experiment_id: self.experiment_id(),
            workflow: self.workflow.clone(),
            dataset: self.dataset.display().to_string(),
            num_instances,
            num_configs: self.num_configs,
            config_seed: self.config_seed,
            test_seeds: self.test_seeds.clone(),
            valid_seeds: self.valid_seeds.clone(),
            test_prop: self.test_prop,
            valid_prop: self.valid_prop,
            stratify: self.stratify,
            monotonic: self.monotonic,
            timeout_on_fit: self.timeout_on_fit,
            schedule: self.schedule,
        }
    }
}
