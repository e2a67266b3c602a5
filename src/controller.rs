//! Learning-curve controller
//!
//! [`LcController`] splits a dataset once, then walks the anchor schedule in
//! increasing order. At every anchor it draws the anchor's training
//! subsample, fits a fresh workflow, predicts on train/val/test and extends
//! the three curves. A fit or predict failure is recorded in the report and
//! stops the walk; anchors scored before the failure are kept.
//!
//! Toyota Way: Jidoka (stop at the first defect, keep what was built)
//!
//! ## Timer layout
//!
//! ```text
//! build_curves
//!  └─ anchor {value}
//!      ├─ create_workflow
//!      ├─ fit ...                 (the workflow's own sub-timer, grafted)
//!      ├─ get_predictions ─ train | val | test
//!      └─ metrics ─ train | val | test ─ <metric> {value}
//! ```

use crate::anchor::AnchorSchedule;
use crate::curve::{Curve, Probabilities};
use crate::curvedb::{CurveDB, FailureKind, Objective, Report, SplitName};
use crate::data::split::{train_valid_test_split, SplitConfig};
use crate::data::{unique_labels, Dataset, DatasetMetadata, Label, Matrix, OneHotEncoder};
use crate::error::WorkflowError;
use crate::timer::Timer;
use crate::workflow::{CancelToken, FitInput, Holdout, Workflow, WorkflowFactory};
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Controller settings
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Seed of the test draw
    pub test_seed: u64,
    /// Seed of the validation draw and of non-monotonic anchor shuffles
    pub valid_seed: u64,
    /// Fraction of the dataset held out for validation
    pub valid_prop: f64,
    /// Fraction of the dataset held out for testing
    pub test_prop: f64,
    /// Preserve class proportions in the held-out partitions
    pub stratify: bool,
    /// Nested anchor subsamples (prefixes of one fixed order)
    pub monotonic: bool,
    /// Wall-clock budget of each fit
    pub timeout_on_fit: Option<Duration>,
    /// Expose the categorical vocabulary to workflows
    pub known_categories: bool,
    /// Propagate fit/predict failures instead of recording them
    pub raise_errors: bool,
    /// Anchor schedule
    pub schedule: AnchorSchedule,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            test_seed: 0,
            valid_seed: 0,
            valid_prop: 0.1,
            test_prop: 0.1,
            stratify: true,
            monotonic: false,
            timeout_on_fit: None,
            known_categories: true,
            raise_errors: false,
            schedule: AnchorSchedule::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the test and validation seeds
    #[must_use]
    pub const fn with_seeds(mut self, test_seed: u64, valid_seed: u64) -> Self {
        self.test_seed = test_seed;
        self.valid_seed = valid_seed;
        self
    }

    /// Set the held-out proportions
    #[must_use]
    pub const fn with_props(mut self, valid_prop: f64, test_prop: f64) -> Self {
        self.valid_prop = valid_prop;
        self.test_prop = test_prop;
        self
    }

    /// Enable or disable stratification
    #[must_use]
    pub const fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    /// Enable or disable nested anchors
    #[must_use]
    pub const fn with_monotonic(mut self, monotonic: bool) -> Self {
        self.monotonic = monotonic;
        self
    }

    /// Bound every fit by `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_on_fit = Some(timeout);
        self
    }

    /// Expose or hide the categorical vocabulary
    #[must_use]
    pub const fn with_known_categories(mut self, known_categories: bool) -> Self {
        self.known_categories = known_categories;
        self
    }

    /// Propagate workflow failures
    #[must_use]
    pub const fn with_raise_errors(mut self, raise_errors: bool) -> Self {
        self.raise_errors = raise_errors;
        self
    }

    /// Use a custom anchor schedule
    #[must_use]
    pub const fn with_schedule(mut self, schedule: AnchorSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Split settings derived from this configuration
    #[must_use]
    pub const fn split_config(&self) -> SplitConfig {
        SplitConfig {
            test_seed: self.test_seed,
            valid_seed: self.valid_seed,
            test_prop: self.test_prop,
            valid_prop: self.valid_prop,
            stratify: self.stratify,
        }
    }

    /// Check proportions and timeout
    ///
    /// # Errors
    /// Returns `InvalidSplit` for bad proportions, `InvalidConfig` for a zero timeout
    pub fn validate(&self) -> Result<()> {
        self.split_config().validate()?;
        if self.timeout_on_fit.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(
                "fit timeout must be positive (omit it to disable)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one fit
struct FitAttempt {
    /// The instance after its fit, unless a timeout or a worker panic took it
    workflow: Option<Box<dyn Workflow>>,
    result: std::result::Result<(), WorkflowError>,
}

/// Predictions of one split
struct SplitPredictions {
    labels: Vec<Label>,
    proba: Matrix,
}

/// Runs one workflow configuration over the anchor schedule
pub struct LcController {
    timer: Timer,
    factory: WorkflowFactory,
    config: ControllerConfig,
    metadata: Arc<DatasetMetadata>,
    labels: Vec<Label>,
    x_train: Matrix,
    y_train: Vec<Label>,
    valid: Holdout,
    test: Holdout,
    anchors: Vec<usize>,

    cur_anchor: Option<usize>,
    x_train_at_anchor: Matrix,
    y_train_at_anchor: Vec<Label>,
    labels_as_used_by_workflow: Vec<Label>,
    curve_db: CurveDB,
    objective: Option<Objective>,
    traceback: Option<String>,
}

impl std::fmt::Debug for LcController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcController")
            .field("config", &self.config)
            .field("anchors", &self.anchors)
            .field("cur_anchor", &self.cur_anchor)
            .field("objective", &self.objective)
            .finish_non_exhaustive()
    }
}

impl LcController {
    /// Split the dataset, derive categorical metadata and the anchor schedule
    ///
    /// # Errors
    /// - `InvalidSplit` / `StratificationFailed` if the split cannot be made
    /// - `InvalidConfig` for a zero timeout or an empty training partition
    pub fn new(
        timer: Timer,
        factory: WorkflowFactory,
        dataset: &Dataset,
        config: ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let split = train_valid_test_split(dataset.x(), dataset.y(), &config.split_config())?;

        let mut metadata = dataset.metadata().clone();
        if metadata.categories.any() {
            // fitted on the full dataset so every anchor shares one vocabulary
            let encoder = OneHotEncoder::fit(dataset.x(), &metadata.categories.columns)?;
            metadata.categories.values = config
                .known_categories
                .then(|| encoder.categories().to_vec());
        } else {
            metadata.categories.values = None;
        }

        let anchors = config.schedule.anchors(split.x_train.rows())?;
        debug!(
            train = split.x_train.rows(),
            valid = split.x_valid.rows(),
            test = split.x_test.rows(),
            ?anchors,
            "dataset split"
        );

        let labels = unique_labels(dataset.y());
        let curve_db = Self::empty_curves(&labels, &timer);
        Ok(Self {
            timer,
            factory,
            config,
            metadata: Arc::new(metadata),
            labels,
            x_train: split.x_train,
            y_train: split.y_train,
            valid: Holdout {
                x: Arc::new(split.x_valid),
                y: split.y_valid.into(),
            },
            test: Holdout {
                x: Arc::new(split.x_test),
                y: split.y_test.into(),
            },
            anchors,
            cur_anchor: None,
            x_train_at_anchor: Matrix::zeros(0, dataset.x().cols()),
            y_train_at_anchor: Vec::new(),
            labels_as_used_by_workflow: Vec::new(),
            curve_db,
            objective: None,
            traceback: None,
        })
    }

    fn empty_curves(labels: &[Label], timer: &Timer) -> CurveDB {
        let curve = || Curve::with_timer(labels.to_vec(), timer.clone());
        CurveDB::new(curve(), curve(), curve(), Default::default())
    }

    /// Anchor schedule
    #[must_use]
    pub fn anchors(&self) -> &[usize] {
        &self.anchors
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Metadata handed to workflows (categorical vocabulary included)
    #[must_use]
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Size of the training partition
    #[must_use]
    pub const fn train_size(&self) -> usize {
        self.x_train.rows()
    }

    /// Current anchor, once [`LcController::set_anchor`] ran
    #[must_use]
    pub const fn cur_anchor(&self) -> Option<usize> {
        self.cur_anchor
    }

    /// Training features of the current anchor
    #[must_use]
    pub const fn x_train_at_anchor(&self) -> &Matrix {
        &self.x_train_at_anchor
    }

    /// Training labels of the current anchor
    #[must_use]
    pub fn y_train_at_anchor(&self) -> &[Label] {
        &self.y_train_at_anchor
    }

    /// Curves built so far
    #[must_use]
    pub const fn curve_db(&self) -> &CurveDB {
        &self.curve_db
    }

    /// Latest objective
    #[must_use]
    pub const fn objective(&self) -> Option<Objective> {
        self.objective
    }

    /// Failure text, if a failure stopped the walk
    #[must_use]
    pub fn traceback(&self) -> Option<&str> {
        self.traceback.as_deref()
    }

    /// Training-partition row order of an anchor
    ///
    /// Monotonic runs use the partition order, so anchors nest. Otherwise
    /// the partition is shuffled with a seed drawn from stream `anchor` of
    /// a generator seeded by `valid_seed`: the subsample depends only on
    /// `(valid_seed, anchor)`, not on the rest of the schedule.
    fn anchor_order(&self, anchor: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.x_train.rows()).collect();
        if !self.config.monotonic {
            let mut seeder = ChaCha8Rng::seed_from_u64(self.config.valid_seed);
            seeder.set_stream(anchor as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(seeder.next_u64());
            order.shuffle(&mut rng);
        }
        order
    }

    /// Draw the training subsample of `anchor`
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `anchor` is zero or larger than the training partition
    pub fn set_anchor(&mut self, anchor: usize) -> Result<()> {
        if anchor == 0 || anchor > self.x_train.rows() {
            return Err(Error::InvalidConfig(format!(
                "anchor {anchor} outside 1..={}",
                self.x_train.rows()
            )));
        }
        let order = self.anchor_order(anchor);
        let rows = &order[..anchor];
        self.x_train_at_anchor = self.x_train.select_rows(rows);
        self.y_train_at_anchor = rows.iter().map(|&i| self.y_train[i].clone()).collect();
        self.cur_anchor = Some(anchor);
        Ok(())
    }

    /// Walk the schedule and build the three curves
    ///
    /// Curves, objective and traceback are reset first, so calling this
    /// twice rebuilds from scratch.
    ///
    /// # Errors
    /// - Configuration errors (factory failure, predictions of the wrong length)
    /// - With `raise_errors`, any fit or predict failure as `Error::Workflow`
    ///
    /// # Panics
    /// If a scope opened under an anchor is left open (timer stack corruption)
    pub fn build_curves(&mut self) -> Result<()> {
        let timer = self.timer.clone();
        self.curve_db = Self::empty_curves(&self.labels, &timer);
        self.objective = None;
        self.traceback = None;

        let _build_curves = timer.time("build_curves", Value::Null);
        for anchor in self.anchors.clone() {
            self.set_anchor(anchor)?;
            let anchor_scope = timer.time("anchor", json!({ "value": anchor }));
            #[allow(clippy::cast_precision_loss)]
            let share = anchor as f64 / self.x_train.rows() as f64 * 100.0;
            info!(anchor, "Running anchor {anchor} which is {share:.2}% of the training set");

            let FitAttempt { workflow, result } = self.fit_workflow_on_current_anchor(&timer)?;
            assert_eq!(
                timer.active_node_id(),
                anchor_scope.id(),
                "The timer stack has more elements than expected. You forgot to stop a started timer. \
                 Active timers: {:?}",
                timer.simplified_stack()
            );

            // a failed fit still reports the iterations it got through
            if let Some(fit_report) = workflow.as_deref().and_then(|w| w.fit_report()) {
                self.curve_db.additional_data_per_anchor.insert(anchor, fit_report);
            }
            let workflow = match (result, workflow) {
                (Ok(()), Some(workflow)) => workflow,
                (Err(err), _) => {
                    self.absorb_failure(anchor, err)?;
                    break;
                }
                (Ok(()), None) => {
                    self.absorb_failure(anchor, WorkflowError::NotFitted)?;
                    break;
                }
            };

            debug!(anchor, "predicting and scoring");
            let predictions = match self.get_predictions(&*workflow, &timer) {
                Ok(predictions) => predictions,
                Err(err) => {
                    self.absorb_failure(anchor, err)?;
                    break;
                }
            };
            self.labels_as_used_by_workflow = workflow.infos().classes.clone();
            self.extend_curves_based_on_predictions(&predictions, &timer)?;

            self.objective = self
                .curve_db
                .val
                .last()
                .map(|(_, record)| Objective::Score(record.accuracy));
        }
        Ok(())
    }

    /// Create a fresh workflow and fit it on the current anchor
    ///
    /// The `Result` carries configuration errors, the attempt the
    /// workflow's own failure.
    fn fit_workflow_on_current_anchor(&self, timer: &Timer) -> Result<FitAttempt> {
        let workflow = {
            let _create = timer.time("create_workflow", Value::Null);
            (self.factory)()?
        };

        let requirements = workflow.requirements();
        let input = FitInput {
            x_train: self.x_train_at_anchor.clone(),
            y_train: self.y_train_at_anchor.clone(),
            valid: requirements.valid.then(|| self.valid.clone()),
            test: requirements.test.then(|| self.test.clone()),
            metadata: Arc::clone(&self.metadata),
            cancel: CancelToken::new(),
        };

        let fit_timer = Timer::with_root("fit", Map::new());
        let attempt = match self.config.timeout_on_fit {
            Some(timeout) => fit_with_timeout(workflow, input, fit_timer.clone(), timeout),
            None => fit_in_place(workflow, &input, &fit_timer),
        };

        // a cancelled fit may still be writing to its sub-timer
        if !matches!(attempt.result, Err(WorkflowError::Timeout { .. })) {
            assert_eq!(
                fit_timer.active_node_id(),
                fit_timer.root_id(),
                "The timer stack has more elements than expected. You forgot to stop a started timer. \
                 Active timers: {:?}",
                fit_timer.simplified_stack()
            );
            fit_timer.finish();
            timer.graft(&fit_timer);
        }
        Ok(attempt)
    }

    fn get_predictions(
        &self,
        workflow: &dyn Workflow,
        timer: &Timer,
    ) -> std::result::Result<[SplitPredictions; 3], WorkflowError> {
        let _get_predictions = timer.time("get_predictions", Value::Null);
        let predict = |split: SplitName, x: &Matrix| -> std::result::Result<SplitPredictions, WorkflowError> {
            let _split = timer.time(split.as_str(), Value::Null);
            Ok(SplitPredictions {
                labels: guarded(|| workflow.predict(x))?,
                proba: guarded(|| workflow.predict_proba(x))?,
            })
        };
        Ok([
            predict(SplitName::Train, &self.x_train_at_anchor)?,
            predict(SplitName::Val, &self.valid.x)?,
            predict(SplitName::Test, &self.test.x)?,
        ])
    }

    fn extend_curves_based_on_predictions(
        &mut self,
        predictions: &[SplitPredictions; 3],
        timer: &Timer,
    ) -> Result<()> {
        let anchor = self
            .cur_anchor
            .ok_or_else(|| Error::InvalidConfig("no anchor set".to_string()))?;
        let _metrics = timer.time("metrics", Value::Null);
        let classes = &self.labels_as_used_by_workflow;
        let targets: [(&[Label], &mut Curve); 3] = [
            (&self.y_train_at_anchor, &mut self.curve_db.train),
            (&self.valid.y, &mut self.curve_db.val),
            (&self.test.y, &mut self.curve_db.test),
        ];
        for ((split, (y_true, curve)), predicted) in SplitName::ALL.into_iter().zip(targets).zip(predictions) {
            let _split = timer.time(split.as_str(), Value::Null);
            let proba = Probabilities {
                classes,
                values: &predicted.proba,
            };
            curve.compute_metrics(anchor, y_true, &predicted.labels, Some(proba))?;
        }
        Ok(())
    }

    fn absorb_failure(&mut self, anchor: usize, err: WorkflowError) -> Result<()> {
        if self.config.raise_errors {
            return Err(Error::Workflow(err));
        }
        let traceback = err.traceback();
        error!(anchor, "Error while fitting or scoring the workflow: {traceback}");

        // a total failure only if no anchor was ever scored
        if self.curve_db.val.is_empty() {
            self.objective = Some(Objective::Failure(FailureKind::from(&err)));
        } else {
            warn!(
                anchor,
                scored = self.curve_db.val.len(),
                "keeping the anchors scored before the failure"
            );
        }
        self.traceback = Some(traceback);
        Ok(())
    }

    /// Bundle curves, run metadata and the timer tree
    #[must_use]
    pub fn into_report(self) -> Report {
        Report {
            valid_prop: self.config.valid_prop,
            test_prop: self.config.test_prop,
            monotonic: self.config.monotonic,
            stratify: self.config.stratify,
            valid_seed: self.config.valid_seed,
            test_seed: self.config.test_seed,
            anchors: self.anchors,
            objective: self.objective,
            traceback: self.traceback,
            labels: self.labels_as_used_by_workflow,
            curve_db: self.curve_db,
            timer: self.timer.as_json(),
        }
    }
}

/// Run workflow code, turning a panic into a `Panicked` failure
fn guarded<T>(
    call: impl FnOnce() -> std::result::Result<T, WorkflowError>,
) -> std::result::Result<T, WorkflowError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(WorkflowError::from_panic(&*payload)))
}

fn fit_in_place(mut workflow: Box<dyn Workflow>, input: &FitInput, fit_timer: &Timer) -> FitAttempt {
    let result = guarded(|| workflow.fit(input, fit_timer));
    FitAttempt {
        workflow: Some(workflow),
        result,
    }
}

/// Fit on a blocking worker and cancel it once `timeout` expires
///
/// A thread cannot be killed: on expiry the fit's [`CancelToken`] is set and
/// the worker is detached. Workflows that poll the token stop at their next
/// iteration; the worker's result is dropped either way.
fn fit_with_timeout(
    mut workflow: Box<dyn Workflow>,
    input: FitInput,
    fit_timer: Timer,
    timeout: Duration,
) -> FitAttempt {
    let lost = |err: WorkflowError| FitAttempt {
        workflow: None,
        result: Err(err),
    };
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => return lost(WorkflowError::Failed(e.into())),
    };

    let cancel = input.cancel.clone();
    let outcome = runtime.block_on(async move {
        let worker = tokio::task::spawn_blocking(move || {
            let result = workflow.fit(&input, &fit_timer);
            FitAttempt {
                workflow: Some(workflow),
                result,
            }
        });
        tokio::time::timeout(timeout, worker).await
    });

    match outcome {
        Ok(Ok(attempt)) => attempt,
        Ok(Err(join_error)) if join_error.is_panic() => {
            lost(WorkflowError::from_panic(&*join_error.into_panic()))
        }
        Ok(Err(join_error)) => lost(WorkflowError::Failed(join_error.into())),
        Err(_elapsed) => {
            cancel.cancel();
            runtime.shutdown_background();
            debug!(timeout = ?timeout, "fit cancelled");
            lost(WorkflowError::Timeout {
                seconds: timeout.as_secs_f64(),
            })
        }
    }
}
