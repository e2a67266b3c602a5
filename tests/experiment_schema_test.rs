//! Experiment Schema Tests
//!
//! Records, rows and the store as a campaign sees them: create rows,
//! persist, run, reload.

use lcdb::anchor::{AnchorSchedule, Growth};
use lcdb::curvedb::{FailureKind, Objective, SplitName};
use lcdb::experiment::{
    create_experiments, CurvePoint, ExperimentPlan, ExperimentRecord, ExperimentStore, RunRecord,
    RunStatus,
};
use lcdb::workflow::WorkflowRegistry;
use lcdb::Error;

fn plan(workflow: &str) -> ExperimentPlan {
    ExperimentPlan {
        experiment_id: "softmax-iris".to_string(),
        workflow: workflow.to_string(),
        dataset: "iris.parquet".to_string(),
        num_instances: 150,
        num_configs: 4,
        config_seed: 7,
        test_seeds: vec![0, 1],
        valid_seeds: vec![0, 1, 2],
        test_prop: 0.1,
        valid_prop: 0.1,
        stratify: true,
        monotonic: false,
        timeout_on_fit: Some(30.0),
        schedule: AnchorSchedule::default(),
    }
}

// =============================================================================
// ExperimentRecord Tests
// =============================================================================

#[test]
fn test_experiment_record_creation() {
    let record = ExperimentRecord::new(plan("softmax_regression"), 24);

    assert_eq!(record.experiment_id(), "softmax-iris");
    assert_eq!(record.workflow(), "softmax_regression");
    assert_eq!(record.dataset(), "iris.parquet");
    assert_eq!(record.row_count(), 24);
    assert!(record.created_at().timestamp() > 0);
}

#[test]
fn test_experiment_record_rebuilds_rows_from_its_plan() {
    let registry = WorkflowRegistry::with_builtins();
    let plan = plan("softmax_regression");
    let rows = create_experiments(&registry, &plan).unwrap();
    let record = ExperimentRecord::new(plan, rows.len());

    let json = serde_json::to_string(&record).unwrap();
    let restored: ExperimentRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.plan().valid_seeds, vec![0, 1, 2]);
    assert_eq!(create_experiments(&registry, restored.plan()).unwrap(), rows);
}

// =============================================================================
// Row creation Tests
// =============================================================================

#[test]
fn test_rows_cross_configs_and_seeds() {
    let registry = WorkflowRegistry::with_builtins();
    let rows = create_experiments(&registry, &plan("softmax_regression")).unwrap();

    // the default configuration is always valid
    assert!(!rows.is_empty());
    assert_eq!(rows.len() % 6, 0);
    assert!(rows.len() <= 24);

    let first = &rows[0];
    assert_eq!(first.row_id, "softmax-iris-c0000-t0-v0");
    assert_eq!(first.train_sizes().unwrap(), vec![16, 32, 64, 120]);
    assert_eq!(first.timeout_on_fit, Some(30.0));

    let space = registry.config_space("softmax_regression").unwrap();
    assert_eq!(first.hyperparameters().unwrap(), space.default_configuration());
}

#[test]
fn test_row_controller_config() {
    let rows = create_experiments(&WorkflowRegistry::with_builtins(), &plan("majority")).unwrap();
    let row = rows.iter().find(|r| r.test_seed == 1 && r.valid_seed == 2).unwrap();

    let config = row.controller_config().unwrap();
    assert_eq!(config.test_seed, 1);
    assert_eq!(config.valid_seed, 2);
    assert_eq!(config.timeout_on_fit, Some(std::time::Duration::from_secs(30)));
    assert!(config.stratify);
}

#[test]
fn test_rows_follow_custom_schedule() {
    let mut plan = plan("majority");
    plan.schedule = AnchorSchedule::new(10, Growth::Linear { step: 40 }).unwrap();
    let rows = create_experiments(&WorkflowRegistry::with_builtins(), &plan).unwrap();
    assert_eq!(rows[0].train_sizes().unwrap(), vec![10, 50, 90, 120]);
}

#[test]
fn test_unknown_workflow_rejected() {
    let result = create_experiments(&WorkflowRegistry::with_builtins(), &plan("random_forest"));
    assert!(matches!(result, Err(Error::UnknownWorkflow(name)) if name == "random_forest"));
}

#[test]
fn test_rows_are_reproducible() {
    let registry = WorkflowRegistry::with_builtins();
    let a = create_experiments(&registry, &plan("nearest_centroid")).unwrap();
    let b = create_experiments(&registry, &plan("nearest_centroid")).unwrap();
    assert_eq!(a, b);
}

// =============================================================================
// RunRecord Tests
// =============================================================================

#[test]
fn test_run_lifecycle() {
    let mut run = RunRecord::new("softmax-iris-c0000-t0-v0", "softmax-iris");
    assert_eq!(run.status(), RunStatus::Pending);
    assert!(run.started_at().is_none());

    run.start();
    assert_eq!(run.status(), RunStatus::Running);
    assert!(run.started_at().is_some());

    run.succeed(Some(Objective::Failure(FailureKind::Timeout)), None);
    assert_eq!(run.status(), RunStatus::Success);
    assert!(run.ended_at() >= run.started_at());
    assert!(run.objective().is_some_and(|o| o.is_failure()));
}

#[test]
fn test_failed_run_keeps_error() {
    let mut run = RunRecord::new("run", "exp");
    run.start();
    run.fail("dataset unreadable");
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.error(), Some("dataset unreadable"));
    assert!(run.objective().is_none());
}

// =============================================================================
// ExperimentStore Tests
// =============================================================================

#[test]
fn test_store_pending_rows_and_reruns() {
    let rows = create_experiments(&WorkflowRegistry::with_builtins(), &plan("majority")).unwrap();
    let mut store = ExperimentStore::new();
    store.add_rows(rows.clone());
    assert_eq!(store.pending_rows().len(), rows.len());

    let mut done = RunRecord::new(&rows[0].row_id, "softmax-iris");
    done.succeed(Some(Objective::Score(0.9)), None);
    store.add_run(done);

    let mut failed = RunRecord::new(&rows[1].row_id, "softmax-iris");
    failed.fail("boom");
    store.add_run(failed);

    // failed runs stay pending so they are retried
    let pending = store.pending_rows();
    assert_eq!(pending.len(), rows.len() - 1);
    assert!(pending.iter().all(|row| row.row_id != rows[0].row_id));
}

#[test]
fn test_store_json_round_trip() {
    let rows = create_experiments(&WorkflowRegistry::with_builtins(), &plan("majority")).unwrap();
    let mut store = ExperimentStore::new();
    store.add_experiment(ExperimentRecord::new(plan("majority"), rows.len()));
    store.add_rows(rows);

    let mut run = RunRecord::new("softmax-iris-c0000-t0-v0", "softmax-iris");
    run.succeed(Some(Objective::Failure(FailureKind::Memory)), Some("reports/r.json".to_string()));
    store.add_run(run.clone());
    store.add_points([
        CurvePoint::new(run.run_id(), SplitName::Val, 32, "accuracy", 0.5),
        CurvePoint::new(run.run_id(), SplitName::Val, 16, "accuracy", 0.25),
    ]);

    let path = std::env::temp_dir().join(format!("lcdb-store-{}.json", std::process::id()));
    store.save_json(&path).unwrap();
    let loaded = ExperimentStore::load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.experiment_count(), 1);
    assert_eq!(loaded.row_count(), store.row_count());
    assert_eq!(loaded.get_run(run.run_id()), Some(&run));

    let curve = loaded.get_curve(run.run_id(), SplitName::Val, "accuracy");
    let anchors: Vec<u64> = curve.iter().map(CurvePoint::anchor).collect();
    assert_eq!(anchors, vec![16, 32]);
}

#[test]
fn test_open_missing_store_is_empty() {
    let path = std::env::temp_dir().join("lcdb-store-that-does-not-exist.json");
    let store = ExperimentStore::open(&path).unwrap();
    assert!(store.is_empty());
}
