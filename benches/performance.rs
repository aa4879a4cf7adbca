use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mrplan_core::config::SkewJoinConfig;
use mrplan_core::types::{Scalar, Tuple};
use mrplan_exec::task::AggregateTask;
use mrplan_operators::agg::AggregateRegistry;
use mrplan_operators::physical::{AggCall, AggStage};
use mrplan_skew::partition::PartitionMap;
use mrplan_skew::router::{JoinSide, SkewRouter};
use mrplan_skew::sample::Sampler;

fn make_rows(rows: usize, keys: i64) -> Vec<(Tuple, Tuple)> {
    (0..rows as i64)
        .map(|i| {
            let key = i % keys;
            (
                Tuple::single(key),
                Tuple::new(vec![Scalar::from(key), Scalar::from(i)]),
            )
        })
        .collect()
}

fn sorted(mut rows: Vec<(Tuple, Tuple)>) -> Vec<(Tuple, Tuple)> {
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn calls(stage: AggStage, column: usize) -> Vec<AggCall> {
    vec![AggCall {
        function: "LongSum".into(),
        stage,
        column,
    }]
}

fn bench_aggregate_paths(c: &mut Criterion) {
    let registry = AggregateRegistry::builtin();
    let input = sorted(make_rows(16 * 1024, 16));
    let mut group = c.benchmark_group("long_sum");

    for chunk_rows in [64usize, 1024] {
        group.bench_with_input(
            BenchmarkId::new("accumulate", chunk_rows),
            &chunk_rows,
            |b, &chunk_rows| {
                b.iter(|| {
                    let mut t =
                        AggregateTask::new(&registry, &calls(AggStage::Whole, 1), chunk_rows)
                            .unwrap();
                    t.run(input.iter().cloned()).unwrap()
                })
            },
        );
    }

    group.bench_function("final", |b| {
        b.iter(|| {
            let mut t = AggregateTask::new(&registry, &calls(AggStage::Final, 1), 0).unwrap();
            t.run(input.iter().cloned()).unwrap()
        })
    });
    group.finish();
}

fn bench_skew_routing(c: &mut Criterion) {
    let rows = make_rows(64 * 1024, 8);
    let mut sampler = Sampler::new(10);
    for (k, v) in &rows {
        sampler.observe(k, v);
    }
    let cfg = SkewJoinConfig {
        max_tuples_per_reducer: 1000,
        ..SkewJoinConfig::default()
    };
    let map = PartitionMap::generate(&sampler.finish(), &cfg, 64).unwrap();
    let router = SkewRouter::new(map).unwrap();

    c.bench_function("skew_route_skewed", |b| {
        b.iter(|| {
            rows.iter()
                .enumerate()
                .map(|(seq, (k, _))| router.route(JoinSide::Skewed, k, seq as u64).len())
                .sum::<usize>()
        })
    });
}

criterion_group!(aggregates, bench_aggregate_paths, bench_skew_routing);
criterion_main!(aggregates);
