//! Analysis over real reports: timer queries, ranking and top-k regret

use lcdb::analysis::{
    anchor_values, anchors_children, metric_values_from_anchors, metric_values_from_epochs,
    rank_curves, regret_from_topk, RankMethod, RankMode,
};
use lcdb::controller::{ControllerConfig, LcController};
use lcdb::curvedb::{Report, SplitName};
use lcdb::data::{Dataset, Matrix};
use lcdb::timer::Timer;
use lcdb::workflow::{Hyperparameters, WorkflowRegistry};
use serde_json::json;

fn dataset() -> Dataset {
    let rows: Vec<Vec<f64>> = (0..200)
        .map(|i| {
            let offset = if i % 2 == 0 { 0.0 } else { 3.0 };
            vec![f64::from(i % 10) / 10.0 + offset, f64::from(i % 4)]
        })
        .collect();
    let y = (0..200).map(|i| if i % 2 == 0 { "a" } else { "b" }.to_string()).collect();
    Dataset::new(Matrix::from_rows(&rows).unwrap(), y).unwrap()
}

fn softmax_report(learning_rate: f64, epochs: u64) -> Report {
    let registry = WorkflowRegistry::with_builtins();
    let mut hyperparameters: Hyperparameters = registry
        .config_space("softmax_regression")
        .unwrap()
        .default_configuration();
    hyperparameters.insert("learning_rate".to_string(), json!(learning_rate));
    hyperparameters.insert("epochs".to_string(), json!(epochs));

    let factory = registry.factory("softmax_regression", &hyperparameters).unwrap();
    let mut controller =
        LcController::new(Timer::new(), factory, &dataset(), ControllerConfig::default()).unwrap();
    controller.build_curves().unwrap();
    controller.into_report()
}

fn val_accuracy(report: &Report) -> Vec<f64> {
    metric_values_from_anchors(&report.timer, "accuracy", SplitName::Val)
        .iter()
        .filter_map(serde_json::Value::as_f64)
        .collect()
}

#[test]
fn test_queries_survive_json_round_trip() {
    let report = softmax_report(0.1, 4);
    let path = std::env::temp_dir().join(format!("lcdb-query-{}.json", std::process::id()));
    report.save_json(&path).unwrap();
    let loaded = Report::load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(anchor_values(&loaded.timer), vec![16, 32, 64, 128, 160]);
    assert_eq!(anchors_children(&loaded.timer).len(), 5);
    assert_eq!(val_accuracy(&loaded).len(), 5);

    // confusion matrices come back as nested arrays
    let matrices = metric_values_from_anchors(&loaded.timer, "confusion_matrix", SplitName::Test);
    assert_eq!(matrices.len(), 5);
    assert!(matrices.iter().all(|m| m.as_array().is_some_and(|rows| rows.len() == 2)));
}

#[test]
fn test_epoch_metrics_follow_eval_epochs() {
    let report = softmax_report(0.1, 4);
    let log_loss = metric_values_from_epochs(&report.timer, "log_loss", SplitName::Train);
    assert_eq!(log_loss.len(), 5);
    // epochs 1, 2 and 4 are evaluated
    assert!(log_loss.iter().all(|values| values.len() == 3));
}

#[test]
fn test_rank_and_regret_over_runs() {
    let curves: Vec<Vec<f64>> = [0.001, 0.05, 0.5]
        .iter()
        .map(|&lr| val_accuracy(&softmax_report(lr, 8)))
        .collect();
    assert!(curves.iter().all(|c| c.len() == 5));

    let ranks = rank_curves(&curves, RankMode::Max, RankMethod::Min, 5).unwrap();
    assert_eq!(ranks.len(), 3);
    assert!(ranks.contains(&1));

    // keeping the single best curve at the last anchor has no regret
    let top1 = regret_from_topk(&curves, 1, RankMode::Max).unwrap();
    assert_eq!(top1.median.len(), 5);
    assert_eq!(top1.median[4], 0.0);

    // keeping every curve bounds the regret by the spread of final values
    let all = regret_from_topk(&curves, 3, RankMode::Max).unwrap();
    let finals: Vec<f64> = curves.iter().map(|c| c[4]).collect();
    let spread = finals.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - finals.iter().copied().fold(f64::INFINITY, f64::min);
    for anchor in 0..5 {
        assert!(all.lower[anchor] <= all.median[anchor]);
        assert!(all.median[anchor] <= all.upper[anchor]);
        assert!(all.upper[anchor] <= spread + 1e-12);
        assert!(all.lower[anchor] >= 0.0);
    }
}

#[test]
fn test_rank_curves_of_different_lengths() {
    // a run stopped early keeps its last value
    let curves = vec![vec![0.5, 0.6], vec![0.4, 0.7, 0.9], vec![0.8]];
    let ranks = rank_curves(&curves, RankMode::Max, RankMethod::Ordinal, 5).unwrap();
    assert_eq!(ranks, vec![3, 1, 2]);

    let ranks = rank_curves(&curves, RankMode::Min, RankMethod::Ordinal, 5).unwrap();
    assert_eq!(ranks, vec![1, 3, 2]);
}
