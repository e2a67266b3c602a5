//! Data preparation benchmarks
//!
//! - Stratified and plain train/valid/test splits
//! - Anchor schedules
//! - Drawing the training subsample of an anchor
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lcdb::anchor::{AnchorSchedule, Growth};
use lcdb::controller::{ControllerConfig, LcController};
use lcdb::data::{Dataset, Label, Matrix, Split, SplitConfig};
use lcdb::timer::Timer;
use lcdb::workflow::{factory, MajorityClassWorkflow};

fn labels(n: usize) -> Vec<Label> {
    (0..n).map(|i| format!("class_{}", i % 7)).collect()
}

#[allow(clippy::cast_precision_loss)]
fn dataset(n: usize) -> Dataset {
    let data: Vec<f64> = (0..n * 8).map(|v| (v % 1_000) as f64).collect();
    Dataset::new(Matrix::new(n, 8, data).unwrap(), labels(n)).unwrap()
}

/// Benchmark index partitioning
fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for size in [1_000, 10_000, 100_000].iter() {
        let y = labels(*size);

        for stratify in [false, true] {
            let config = SplitConfig {
                stratify,
                ..SplitConfig::default()
            };
            let id = format!("{}/{size}", if stratify { "stratified" } else { "plain" });
            group.bench_with_input(BenchmarkId::from_parameter(id), size, |b, _| {
                b.iter(|| {
                    let split = Split::compute(&y, &config).unwrap();
                    black_box(split);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark schedule generation
fn bench_anchor_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("anchor_schedule");

    let schedules = [
        ("doubling", AnchorSchedule::default()),
        (
            "sqrt2",
            AnchorSchedule::new(16, Growth::Geometric { base: std::f64::consts::SQRT_2 }).unwrap(),
        ),
        ("linear", AnchorSchedule::new(16, Growth::Linear { step: 256 }).unwrap()),
    ];
    for (name, schedule) in &schedules {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let anchors = schedule.anchors(black_box(1_000_000)).unwrap();
                black_box(anchors);
            });
        });
    }

    group.finish();
}

/// Benchmark drawing anchor subsamples
fn bench_set_anchor(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_anchor");

    for monotonic in [false, true] {
        let data = dataset(50_000);
        let config = ControllerConfig::default().with_monotonic(monotonic);
        let mut controller =
            LcController::new(Timer::new(), factory(MajorityClassWorkflow::new), &data, config)
                .unwrap();
        let anchor = *controller.anchors().last().unwrap();
        let name = if monotonic { "monotonic" } else { "shuffled" };

        group.bench_function(name, |b| {
            b.iter(|| {
                controller.set_anchor(black_box(anchor)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_anchor_schedule, bench_set_anchor);
criterion_main!(benches);
