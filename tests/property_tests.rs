//! Property-based tests for LCDB
//!
//! - Test schedule and split invariants over random sizes and seeds
//! - Test subsample reproducibility of the controller
//! - Run with ProptestConfig::with_cases(100)

use lcdb::anchor::{AnchorSchedule, Growth};
use lcdb::controller::{ControllerConfig, LcController};
use lcdb::data::split::{Split, SplitConfig};
use lcdb::data::{Dataset, Label, Matrix};
use lcdb::timer::Timer;
use lcdb::workflow::{factory, MajorityClassWorkflow};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Labels of three classes with at least `min_per_class` members each
fn arb_labels(min_per_class: usize) -> impl Strategy<Value = Vec<Label>> {
    proptest::collection::vec(min_per_class..min_per_class + 40, 3).prop_map(|sizes| {
        sizes
            .iter()
            .zip(["a", "b", "c"])
            .flat_map(|(&size, class)| std::iter::repeat(class.to_string()).take(size))
            .collect()
    })
}

fn arb_growth() -> impl Strategy<Value = Growth> {
    prop_oneof![
        (1.05f64..3.0).prop_map(|base| Growth::Geometric { base }),
        (1usize..64).prop_map(|step| Growth::Linear { step }),
    ]
}

/// Dataset whose single feature is the row index
fn indexed_dataset(n: usize) -> Dataset {
    let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
    let y = (0..n).map(|i| if i % 2 == 0 { "even" } else { "odd" }.to_string()).collect();
    Dataset::new(Matrix::from_rows(&rows).unwrap(), y).unwrap()
}

fn controller(n: usize, config: ControllerConfig) -> LcController {
    LcController::new(
        Timer::new(),
        factory(MajorityClassWorkflow::new),
        &indexed_dataset(n),
        config,
    )
    .unwrap()
}

fn ids_at_anchor(controller: &mut LcController, anchor: usize) -> Vec<f64> {
    controller.set_anchor(anchor).unwrap();
    controller.x_train_at_anchor().column(0)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Anchor Schedule Properties
    // ========================================================================

    /// Property: schedules are strictly increasing and end at the training size
    #[test]
    fn prop_schedule_strictly_increasing(
        min_anchor in 1usize..64,
        growth in arb_growth(),
        max_size in 1usize..5000
    ) {
        let schedule = AnchorSchedule::new(min_anchor, growth).unwrap();
        let anchors = schedule.anchors(max_size).unwrap();

        prop_assert_eq!(anchors.last().copied(), Some(max_size));
        prop_assert_eq!(anchors[0], min_anchor.min(max_size));
        for pair in anchors.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// Property: the default schedule is the powers of two from 16 plus the maximum
    #[test]
    fn prop_default_schedule_doubles(max_size in 17usize..100_000) {
        let anchors = AnchorSchedule::default().anchors(max_size).unwrap();
        let (last, body) = anchors.split_last().unwrap();

        prop_assert_eq!(*last, max_size);
        for (k, anchor) in body.iter().enumerate() {
            prop_assert_eq!(*anchor, 16usize << k);
        }
        prop_assert!(body.last().map_or(true, |&a| a < max_size && 2 * a >= max_size));
    }

    /// Property: schedules are a pure function of their inputs
    #[test]
    fn prop_schedule_deterministic(growth in arb_growth(), max_size in 1usize..5000) {
        let schedule = AnchorSchedule::new(16, growth).unwrap();
        prop_assert_eq!(schedule.anchors(max_size).unwrap(), schedule.anchors(max_size).unwrap());
    }

    // ========================================================================
    // Split Properties
    // ========================================================================

    /// Property: the three partitions are disjoint and cover every instance
    #[test]
    fn prop_split_partitions_indices(
        labels in arb_labels(20),
        test_seed in any::<u64>(),
        valid_seed in any::<u64>(),
        stratify in any::<bool>()
    ) {
        let config = SplitConfig { test_seed, valid_seed, stratify, ..SplitConfig::default() };
        let split = Split::compute(&labels, &config).unwrap();

        let all: Vec<usize> = split
            .train()
            .iter()
            .chain(split.valid())
            .chain(split.test())
            .copied()
            .collect();
        let unique: BTreeSet<usize> = all.iter().copied().collect();
        prop_assert_eq!(all.len(), labels.len());
        prop_assert_eq!(unique.len(), labels.len());
        prop_assert_eq!(split.train().len(), config.train_size(labels.len()));
    }

    /// Property: stratified hold-outs keep every class within one instance of its share
    #[test]
    fn prop_stratified_test_set_proportional(labels in arb_labels(20), test_seed in any::<u64>()) {
        let config = SplitConfig { test_seed, ..SplitConfig::default() };
        let split = Split::compute(&labels, &config).unwrap();

        let n = labels.len() as f64;
        let test_n = split.test().len() as f64;
        for class in ["a", "b", "c"] {
            let total = labels.iter().filter(|l| *l == class).count() as f64;
            let held = split.test().iter().filter(|&&i| labels[i] == class).count() as f64;
            prop_assert!((held - total * test_n / n).abs() < 1.0);
        }
    }

    /// Property: the same seeds give the same partition
    #[test]
    fn prop_split_deterministic(labels in arb_labels(20), seed in any::<u64>()) {
        let config = SplitConfig { test_seed: seed, valid_seed: seed, ..SplitConfig::default() };
        prop_assert_eq!(
            Split::compute(&labels, &config).unwrap(),
            Split::compute(&labels, &config).unwrap()
        );
    }

    /// Property: the validation seed never moves the test set
    #[test]
    fn prop_valid_seed_keeps_test_set(
        labels in arb_labels(20),
        test_seed in any::<u64>(),
        seeds in (any::<u64>(), any::<u64>())
    ) {
        let split = |valid_seed| {
            let config = SplitConfig { test_seed, valid_seed, ..SplitConfig::default() };
            Split::compute(&labels, &config).unwrap()
        };
        let (a, b) = (split(seeds.0), split(seeds.1));
        prop_assert_eq!(a.test(), b.test());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Anchor Subsample Properties
    // ========================================================================

    /// Property: monotonic subsamples nest
    #[test]
    fn prop_monotonic_subsamples_nest(n in 60usize..400, seed in any::<u64>()) {
        let config = ControllerConfig::default().with_seeds(seed, seed).with_monotonic(true);
        let mut controller = controller(n, config);

        let anchors = controller.anchors().to_vec();
        let mut previous: Vec<f64> = Vec::new();
        for anchor in anchors {
            let ids = ids_at_anchor(&mut controller, anchor);
            prop_assert_eq!(ids.len(), anchor);
            prop_assert_eq!(&ids[..previous.len()], previous.as_slice());
            previous = ids;
        }
    }

    /// Property: a non-monotonic subsample depends only on the seed and the anchor
    #[test]
    fn prop_subsample_reproducible(n in 60usize..400, seed in any::<u64>(), pick in any::<prop::sample::Index>()) {
        let config = ControllerConfig::default().with_seeds(0, seed);
        let mut first = controller(n, config.clone());
        let mut second = controller(n, config);

        let anchors = first.anchors().to_vec();
        let anchor = anchors[pick.index(anchors.len())];
        let a = ids_at_anchor(&mut first, anchor);

        // visiting another anchor first does not change the draw
        let _ = ids_at_anchor(&mut second, anchors[0]);
        let b = ids_at_anchor(&mut second, anchor);
        prop_assert_eq!(a, b);
    }

    /// Property: non-monotonic subsamples are drawn independently per anchor
    #[test]
    fn prop_non_monotonic_subsamples_do_not_nest(n in 200usize..400, seed in any::<u64>()) {
        let mut controller = controller(n, ControllerConfig::default().with_seeds(seed, seed));
        let small = ids_at_anchor(&mut controller, 16);
        let large = ids_at_anchor(&mut controller, 32);

        prop_assert_ne!(&large[..16], small.as_slice());
        let large: BTreeSet<u64> = large.iter().map(|v| v.to_bits()).collect();
        prop_assert!(!small.iter().all(|v| large.contains(&v.to_bits())));
    }

    /// Property: an anchor's subsample does not depend on the rest of the schedule
    #[test]
    fn prop_subsample_independent_of_schedule(n in 200usize..400, seed in any::<u64>()) {
        let config = ControllerConfig::default().with_seeds(seed, seed);
        let linear = AnchorSchedule::new(16, Growth::Linear { step: 16 }).unwrap();
        let mut doubling = controller(n, config.clone());
        let mut stepping = controller(n, config.with_schedule(linear));
        prop_assert_ne!(doubling.anchors().len(), stepping.anchors().len());

        let a = ids_at_anchor(&mut doubling, 32);
        let b = ids_at_anchor(&mut stepping, 32);
        prop_assert_eq!(a, b);
    }

    /// Property: a subsample draws distinct training rows
    #[test]
    fn prop_subsample_without_replacement(n in 60usize..400, seed in any::<u64>()) {
        let mut controller = controller(n, ControllerConfig::default().with_seeds(seed, seed));
        let anchor = controller.anchors()[0];
        let ids = ids_at_anchor(&mut controller, anchor);
        let unique: BTreeSet<u64> = ids.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(unique.len(), ids.len());
    }
}
