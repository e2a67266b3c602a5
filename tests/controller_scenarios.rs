//! Controller scenario tests
//!
//! A scripted workflow injects failures at chosen anchors so that the
//! fail-stop behavior, the failure sentinels and the timeout path can be
//! observed end to end through the report.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lcdb::analysis::{
    anchor_values, epoch_values, metric_values_from_anchors, metric_values_from_epochs,
};
use lcdb::controller::{ControllerConfig, LcController};
use lcdb::curvedb::{FailureKind, Objective, Report, SplitName};
use lcdb::data::{Dataset, Label, Matrix};
use lcdb::timer::Timer;
use lcdb::workflow::{
    factory, FitInput, MajorityClassWorkflow, Workflow, WorkflowInfos, WorkflowRegistry,
};
use lcdb::{Error, WorkflowError};

// ============================================================================
// Scripted workflow
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Fault {
    Nothing,
    OutOfMemoryAt(usize),
    FailAt(usize),
    SleepAt(usize, Duration),
    PanicAt(usize),
    PredictFailAt(usize),
    PredictPanicAt(usize),
}

/// Majority-class workflow that misbehaves at one anchor size
struct Scripted {
    inner: MajorityClassWorkflow,
    fault: Fault,
    fitted_on: usize,
}

impl Scripted {
    fn new(fault: Fault) -> Self {
        Self {
            inner: MajorityClassWorkflow::new(),
            fault,
            fitted_on: 0,
        }
    }
}

impl Workflow for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fit(&mut self, input: &FitInput, timer: &Timer) -> Result<(), WorkflowError> {
        let n = input.y_train.len();
        self.fitted_on = n;
        match self.fault {
            Fault::OutOfMemoryAt(at) if at == n => {
                return Err(WorkflowError::OutOfMemory("cannot allocate the kernel matrix".into()));
            }
            Fault::FailAt(at) if at == n => {
                return Err(WorkflowError::Failed(anyhow::anyhow!("solver failed at {n} rows")));
            }
            Fault::SleepAt(at, pause) if at == n => std::thread::sleep(pause),
            Fault::PanicAt(at) if at == n => panic!("scripted panic at {n} rows"),
            _ => {}
        }
        self.inner.fit(input, timer)
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<Label>, WorkflowError> {
        match self.fault {
            Fault::PredictFailAt(at) if at == self.fitted_on => {
                return Err(WorkflowError::Failed(anyhow::anyhow!("predict failed")));
            }
            Fault::PredictPanicAt(at) if at == self.fitted_on => {
                panic!("scripted predict panic at {at} rows")
            }
            _ => {}
        }
        self.inner.predict(x)
    }

    fn predict_proba(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        self.inner.predict_proba(x)
    }

    fn infos(&self) -> &WorkflowInfos {
        self.inner.infos()
    }

    fn fit_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "rows": self.fitted_on }))
    }
}

/// Sleeps through `steps` short steps, stopping when the fit is cancelled
struct Stepper {
    inner: MajorityClassWorkflow,
    steps: usize,
    step: Duration,
    done: Arc<AtomicUsize>,
}

impl Workflow for Stepper {
    fn name(&self) -> &str {
        "stepper"
    }

    fn fit(&mut self, input: &FitInput, timer: &Timer) -> Result<(), WorkflowError> {
        for _ in 0..self.steps {
            input.cancel.check()?;
            std::thread::sleep(self.step);
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.fit(input, timer)
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<Label>, WorkflowError> {
        self.inner.predict(x)
    }

    fn predict_proba(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        self.inner.predict_proba(x)
    }

    fn infos(&self) -> &WorkflowInfos {
        self.inner.infos()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 100 rows, two balanced classes; anchors are [16, 32, 64, 80]
fn dataset() -> Dataset {
    let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i), f64::from(i % 3)]).collect();
    let y = (0..100).map(|i| if i % 2 == 0 { "even" } else { "odd" }.to_string()).collect();
    Dataset::new(Matrix::from_rows(&rows).unwrap(), y).unwrap()
}

fn run(fault: Fault, config: ControllerConfig) -> Report {
    let mut controller = LcController::new(
        Timer::new(),
        factory(move || Scripted::new(fault)),
        &dataset(),
        config,
    )
    .unwrap();
    controller.build_curves().unwrap();
    controller.into_report()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_clean_run_scores_every_anchor() {
    let report = run(Fault::Nothing, ControllerConfig::default());
    assert_eq!(report.anchors, vec![16, 32, 64, 80]);
    for split in SplitName::ALL {
        assert_eq!(report.curve_db.curve(split).anchors(), &[16, 32, 64, 80]);
    }
    assert!(report.traceback.is_none());
    let last_val = report.curve_db.val.get(80).unwrap().accuracy;
    assert_eq!(report.objective, Some(Objective::Score(last_val)));
}

#[test]
fn test_memory_error_on_first_anchor() {
    let report = run(Fault::OutOfMemoryAt(16), ControllerConfig::default());

    assert!(report.curve_db.val.is_empty());
    assert!(report.curve_db.is_empty());
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Memory)));
    assert!(report.is_total_failure());
    assert!(report.traceback.as_deref().unwrap().contains("out of memory"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["objective"], "F_memory_error");
}

#[test]
fn test_failure_stops_at_anchor_and_keeps_earlier_points() {
    let report = run(Fault::FailAt(64), ControllerConfig::default());

    assert_eq!(report.curve_db.val.anchors(), &[16, 32]);
    assert_eq!(report.curve_db.train.anchors(), &[16, 32]);
    assert_eq!(report.curve_db.test.anchors(), &[16, 32]);
    assert!(report.traceback.as_deref().unwrap().contains("solver failed at 64 rows"));

    // the objective stays the last successful validation accuracy
    let at_32 = report.curve_db.val.get(32).unwrap().accuracy;
    assert_eq!(report.objective, Some(Objective::Score(at_32)));
    assert!(!report.is_total_failure());

    // the failing anchor was opened in the timer, the next one never was
    assert_eq!(anchor_values(&report.timer), vec![16, 32, 64]);
}

#[test]
fn test_generic_failure_on_first_anchor() {
    let report = run(Fault::FailAt(16), ControllerConfig::default());
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Generic)));
    assert_eq!(serde_json::to_value(&report).unwrap()["objective"], "F");
}

#[test]
fn test_timeout_on_first_anchor() {
    let config = ControllerConfig::default().with_timeout(Duration::from_millis(100));
    let report = run(Fault::SleepAt(16, Duration::from_secs(2)), config);

    assert!(report.curve_db.val.is_empty());
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Timeout)));
    assert!(report.traceback.as_deref().unwrap().contains("timed out"));
    assert_eq!(
        serde_json::to_value(&report).unwrap()["objective"],
        "F_function_call_timeout_error"
    );
}

#[test]
fn test_timeout_after_success_keeps_curve() {
    let config = ControllerConfig::default().with_timeout(Duration::from_millis(100));
    let report = run(Fault::SleepAt(32, Duration::from_secs(2)), config);

    assert_eq!(report.curve_db.val.anchors(), &[16]);
    assert!(matches!(report.objective, Some(Objective::Score(_))));
}

#[test]
fn test_fast_fit_under_timeout_succeeds() {
    let config = ControllerConfig::default().with_timeout(Duration::from_secs(30));
    let report = run(Fault::Nothing, config);
    assert_eq!(report.curve_db.val.anchors(), &[16, 32, 64, 80]);
}

#[test]
fn test_panic_is_recorded_as_failure() {
    let report = run(Fault::PanicAt(16), ControllerConfig::default());
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Generic)));
    assert!(report.traceback.as_deref().unwrap().contains("scripted panic"));
}

#[test]
fn test_panic_under_timeout_is_recorded_as_failure() {
    let config = ControllerConfig::default().with_timeout(Duration::from_secs(30));
    let report = run(Fault::PanicAt(32), config);
    assert_eq!(report.curve_db.val.anchors(), &[16]);
    assert!(report.traceback.as_deref().unwrap().contains("scripted panic"));
}

#[test]
fn test_predict_failure_stops_the_run() {
    let report = run(Fault::PredictFailAt(32), ControllerConfig::default());
    assert_eq!(report.curve_db.val.anchors(), &[16]);
    assert!(report.traceback.as_deref().unwrap().contains("predict failed"));
}

#[test]
fn test_predict_panic_keeps_earlier_anchors() {
    let report = run(Fault::PredictPanicAt(32), ControllerConfig::default());
    assert_eq!(report.curve_db.val.anchors(), &[16]);
    assert!(matches!(report.objective, Some(Objective::Score(_))));
    assert!(report.traceback.as_deref().unwrap().contains("scripted predict panic at 32 rows"));
}

#[test]
fn test_predict_panic_on_first_anchor_is_generic_failure() {
    let config = ControllerConfig::default().with_timeout(Duration::from_secs(30));
    let report = run(Fault::PredictPanicAt(16), config);
    assert!(report.curve_db.is_empty());
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Generic)));
}

#[test]
fn test_timed_out_fit_is_cancelled() {
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    let mut controller = LcController::new(
        Timer::new(),
        factory(move || Stepper {
            inner: MajorityClassWorkflow::new(),
            steps: 20,
            step: Duration::from_millis(100),
            done: Arc::clone(&counter),
        }),
        &dataset(),
        ControllerConfig::default().with_timeout(Duration::from_millis(150)),
    )
    .unwrap();
    controller.build_curves().unwrap();
    let report = controller.into_report();
    assert_eq!(report.objective, Some(Objective::Failure(FailureKind::Timeout)));

    // the worker finishes its current step, sees the cancellation and stops
    std::thread::sleep(Duration::from_millis(600));
    let settled = done.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(done.load(Ordering::SeqCst), settled);
    assert!(settled < 20, "worker ran {settled} of 20 steps");
}

#[test]
fn test_failed_fit_keeps_its_fit_report() {
    let report = run(Fault::FailAt(64), ControllerConfig::default());
    let data = &report.curve_db.additional_data_per_anchor;
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![16, 32, 64]);
    assert_eq!(data[&64]["rows"], 64);
}

#[test]
fn test_raise_errors_propagates() {
    let mut controller = LcController::new(
        Timer::new(),
        factory(|| Scripted::new(Fault::FailAt(32))),
        &dataset(),
        ControllerConfig::default().with_raise_errors(true),
    )
    .unwrap();

    let result = controller.build_curves();
    assert!(matches!(result, Err(Error::Workflow(WorkflowError::Failed(_)))));
    assert_eq!(controller.curve_db().val.anchors(), &[16]);
}

#[test]
fn test_rebuilding_curves_starts_fresh() {
    let mut controller = LcController::new(
        Timer::new(),
        factory(|| Scripted::new(Fault::Nothing)),
        &dataset(),
        ControllerConfig::default(),
    )
    .unwrap();
    controller.build_curves().unwrap();
    controller.build_curves().unwrap();
    assert_eq!(controller.curve_db().val.anchors(), &[16, 32, 64, 80]);
}

#[test]
fn test_report_json_round_trip() {
    let report = run(Fault::FailAt(64), ControllerConfig::default().with_seeds(3, 4));
    let path = std::env::temp_dir().join(format!("lcdb-report-{}.json", std::process::id()));
    report.save_json(&path).unwrap();
    let loaded = Report::load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.anchors, report.anchors);
    let score = |r: &Report| r.objective.and_then(|o| o.score()).unwrap();
    assert!((score(&loaded) - score(&report)).abs() < 1e-12);
    assert_eq!(loaded.traceback, report.traceback);
    assert_eq!(loaded.labels, report.labels);
    assert_eq!(loaded.test_seed, 3);
    assert_eq!(loaded.valid_seed, 4);
    assert_eq!(loaded.curve_db.val.anchors(), &[16, 32]);
    assert_eq!(anchor_values(&loaded.timer), vec![16, 32, 64]);
}

#[test]
fn test_timer_metrics_match_curves() {
    let report = run(Fault::Nothing, ControllerConfig::default());
    let from_timer: Vec<f64> = metric_values_from_anchors(&report.timer, "accuracy", SplitName::Val)
        .iter()
        .filter_map(serde_json::Value::as_f64)
        .collect();
    let from_curve: Vec<f64> = report
        .curve_db
        .val
        .values("accuracy")
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(from_timer, from_curve);
}

#[test]
fn test_softmax_epochs_are_queryable() {
    let registry = WorkflowRegistry::with_builtins();
    let space = registry.config_space("softmax_regression").unwrap();
    let workflow = registry
        .factory("softmax_regression", &space.default_configuration())
        .unwrap();

    let mut controller =
        LcController::new(Timer::new(), workflow, &dataset(), ControllerConfig::default()).unwrap();
    controller.build_curves().unwrap();
    let report = controller.into_report();
    assert_eq!(report.curve_db.val.anchors(), &[16, 32, 64, 80]);

    let evaluated = epoch_values(&report.timer, true);
    assert_eq!(evaluated.len(), 4);
    for epochs in &evaluated {
        assert_eq!(epochs, &[1, 2, 4, 8, 16, 20]);
    }
    assert!(epoch_values(&report.timer, false).iter().all(|epochs| epochs.len() == 20));

    let val_accuracy = metric_values_from_epochs(&report.timer, "accuracy", SplitName::Val);
    assert_eq!(val_accuracy.len(), 4);
    assert!(val_accuracy.iter().all(|values| values.len() == 6));
    assert_eq!(report.curve_db.additional_data_per_anchor.len(), 4);
}
