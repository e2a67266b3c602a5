//! Error types for LCDB
//!
//! Two families of failures live here:
//! - [`Error`]: configuration and programming errors that propagate to the caller
//! - [`WorkflowError`]: fit/predict failures that the controller absorbs into the report
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// LCDB error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid controller, experiment or CLI configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Split proportions cannot produce a train set
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// Stratified split impossible with the given class counts
    #[error("Stratification failed: {0}\nUse stratify = false or a larger dataset")]
    StratificationFailed(String),

    /// Two arrays that must line up do not
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Where the mismatch was detected
        context: String,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Curve lookup for an anchor that was never scored
    #[error("Anchor {0} not found in curve")]
    AnchorNotFound(usize),

    /// Workflow name missing from the registry
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// Ranking mode other than `min` or `max`
    #[error("Unknown rank mode '{0}' should be 'max' or 'min'")]
    UnknownRankMode(String),

    /// Hyperparameter value outside its configuration space
    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// Workflow failure surfaced because `raise_errors` is set
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Storage error (Parquet/Arrow layout problems)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure raised by a workflow while fitting or predicting.
///
/// The variant decides the failure sentinel of a run that never scored an
/// anchor (see [`crate::curvedb::FailureKind`]).
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Fit exceeded the wall-clock budget and was abandoned
    #[error("function call timed out after {seconds:.3}s")]
    Timeout {
        /// Budget that was exceeded
        seconds: f64,
    },

    /// Workflow could not allocate what it needed
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Fit stopped because its budget expired
    #[error("fit cancelled after the timeout expired")]
    Cancelled,

    /// Workflow code panicked
    #[error("workflow panicked: {0}")]
    Panicked(String),

    /// Predict called before a successful fit
    #[error("workflow is not fitted")]
    NotFitted,

    /// Any other failure
    #[error("{0:#}")]
    Failed(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Convert a caught panic payload into a `Panicked` error.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }

    /// Text stored as a report's traceback
    ///
    /// `Failed` keeps its full cause chain, plus the backtrace anyhow
    /// captured when `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` enable it.
    #[must_use]
    pub fn traceback(&self) -> String {
        match self {
            Self::Failed(source) => format!("{source:?}"),
            other => other.to_string(),
        }
    }
}
