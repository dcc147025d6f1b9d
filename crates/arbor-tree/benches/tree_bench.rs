//! Criterion benchmarks for arbor-tree: tree growth, evaluation, cross-validation.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use arbor_tree::{CrossValidation, PruningConfig, Record, RecordParser, SplitCriterion, TreeConfig};

fn make_records(n_records: usize, n_features: usize, n_classes: usize, seed: u64) -> Vec<Record> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let lines: Vec<String> = (0..n_records)
        .map(|i| {
            let class = i % n_classes;
            let mut parts: Vec<String> = (0..n_features)
                .map(|f| {
                    let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                    format!("f{f}:{:.4}", base + rng.r#gen::<f64>() * 4.0)
                })
                .collect();
            parts.push(format!("kind:k{}", rng.gen_range(0..4)));
            parts.push(format!("cls:c{class}"));
            parts.join(",")
        })
        .collect();
    RecordParser::new().parse_all(&lines).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let records = make_records(500, 10, 4, 42);

    for criterion in [SplitCriterion::InfoGain, SplitCriterion::Gini, SplitCriterion::GainRatio] {
        let cfg = TreeConfig::new().with_criterion(criterion);
        c.bench_function(&format!("tree_fit_500x10_{criterion}"), |b| {
            b.iter(|| cfg.fit(&records, "cls").unwrap());
        });
    }
}

fn bench_train_pruned(c: &mut Criterion) {
    let records = make_records(500, 10, 4, 42);
    let cfg = TreeConfig::new().with_pruning(Some(PruningConfig::new()));

    c.bench_function("tree_train_pruned_500x10", |b| {
        b.iter(|| cfg.train(&records, &[], "cls").unwrap());
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let train = make_records(500, 10, 4, 42);
    let test = make_records(500, 10, 4, 7);
    let tree = TreeConfig::new().fit(&train, "cls").unwrap();

    c.bench_function("tree_evaluate_500", |b| {
        b.iter(|| tree.evaluate(&test).unwrap());
    });
}

fn bench_cross_validation(c: &mut Criterion) {
    let pooled = make_records(500, 10, 4, 42);
    let cfg = TreeConfig::new();

    c.bench_function("cv_10fold_sequential_500", |b| {
        let cv = CrossValidation::new(10).with_parallel(false);
        b.iter(|| cv.evaluate(&cfg, &pooled, "cls").unwrap());
    });
    c.bench_function("cv_10fold_parallel_500", |b| {
        let cv = CrossValidation::new(10).with_parallel(true);
        b.iter(|| cv.evaluate(&cfg, &pooled, "cls").unwrap());
    });
}

criterion_group!(
    benches,
    bench_fit,
    bench_train_pruned,
    bench_evaluate,
    bench_cross_validation
);
criterion_main!(benches);
