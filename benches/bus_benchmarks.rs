use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dashbus::{bridge::Inbound, bus::LocalBus};
use serde_json::json;

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    for subscribers in [1usize, 10, 100] {
        let bus = LocalBus::new();
        // половина подписчиков совпадает, половина нет
        for i in 0..subscribers {
            let pattern = if i % 2 == 0 { "src/**" } else { "dst/*" };
            bus.subscribe(pattern, |msg| {
                black_box(&msg.payload);
                Ok(())
            });
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &bus,
            |b, bus| b.iter(|| bus.publish("src/temp/kitchen", black_box(json!(21.5)))),
        );
    }
    group.finish();
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let bus = LocalBus::new();
    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            let id = bus.subscribe(black_box("src/*"), |_| Ok(()));
            black_box(bus.unsubscribe(id));
        })
    });
}

fn bench_decode_frame(c: &mut Criterion) {
    let push = r#"{"type":"Publish","topic":"src/temp/kitchen","payload":{"value":21.5,"unit":"C"}}"#;
    let reply = r#"{"reply":"List","key":"layout/","value":["layout/main","layout/night"]}"#;
    c.bench_function("decode_push", |b| {
        b.iter(|| black_box(Inbound::decode(black_box(push))))
    });
    c.bench_function("decode_reply", |b| {
        b.iter(|| black_box(Inbound::decode(black_box(reply))))
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_subscribe_unsubscribe,
    bench_decode_frame
);
criterion_main!(benches);
