use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dashbus::topic::{is_pattern, matches, validate_topic};

fn bench_matches(c: &mut Criterion) {
    let topic = "src/plant/line-3/press-7/temperature";
    let cases = [
        ("exact", "src/plant/line-3/press-7/temperature"),
        ("single", "src/plant/*/press-7/*"),
        ("recursive_tail", "src/**"),
        ("recursive_middle", "src/**/temperature"),
        ("miss", "dst/**"),
    ];

    let mut group = c.benchmark_group("matches");
    for (name, pattern) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &pattern, |b, pattern| {
            b.iter(|| black_box(matches(black_box(pattern), black_box(topic))))
        });
    }
    group.finish();
}

fn bench_deep_single(c: &mut Criterion) {
    let topic = (0..32)
        .map(|i| format!("level{i}"))
        .collect::<Vec<_>>()
        .join("/");
    let pattern = topic.replace("level16", "*");
    c.bench_function("matches_deep_single", |b| {
        b.iter(|| black_box(matches(black_box(&pattern), black_box(&topic))))
    });
}

fn bench_validate(c: &mut Criterion) {
    c.bench_function("validate_topic", |b| {
        b.iter(|| black_box(validate_topic(black_box("dst/panel/button/state"))))
    });
    c.bench_function("is_pattern", |b| {
        b.iter(|| black_box(is_pattern(black_box("src/plant/*/press-7"))))
    });
}

criterion_group!(benches, bench_matches, bench_deep_single, bench_validate);
criterion_main!(benches);
