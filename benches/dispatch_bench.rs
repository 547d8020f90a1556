use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use coin_track::component_a::{
    counter::TallySnapshot,
    dispatch::DispatchPolicy,
    edge::SensorChannel,
    sensor::Chute,
};

fn edge_sampling_bench(c: &mut Criterion) {
    let mut channel = SensorChannel::new(Chute::One, true, true);
    let mut level = false;

    c.bench_function("edge_sample", |b| {
        b.iter(|| {
            level = !level;
            black_box(channel.sample(black_box(level)))
        })
    });
}

fn dispatch_decision_bench(c: &mut Criterion) {
    let policy = DispatchPolicy::with_watermarks(5, [20, 15, 0]);
    let tally = TallySnapshot { per_chute: [24, 19, 4], global: 47 };

    c.bench_function("dispatch_decide_none_due", |b| {
        b.iter(|| policy.decide(black_box(&tally)))
    });
}

criterion_group!(benches, edge_sampling_bench, dispatch_decision_bench);
criterion_main!(benches);
