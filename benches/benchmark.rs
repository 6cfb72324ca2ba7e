use criterion::{black_box, criterion_group, criterion_main, Criterion};
use priority_emitter::{EventEmitter, LinkFilter, Listener, ListenerOptions, Value};

fn bench_emit(c: &mut Criterion) {
    let emitter = EventEmitter::new();
    for priority in 0..16 {
        emitter.on(
            "tick",
            Listener::new(|e| {
                black_box(&e.data);
            }),
            ListenerOptions::new().priority(priority % 4),
        );
    }
    c.bench_function("emit 16 listeners", |b| {
        b.iter(|| emitter.emit("tick", black_box(Value::from(1))))
    });
}

fn bench_notice(c: &mut Criterion) {
    let source = EventEmitter::new();
    let follower = EventEmitter::new();
    source
        .attach_hard(&follower, LinkFilter::all())
        .expect("attach");
    follower.on(
        "noticed",
        Listener::new(|e| {
            black_box(&e.data);
        }),
        ListenerOptions::new(),
    );
    c.bench_function("emit with sync follower", |b| {
        b.iter(|| source.emit("tick", black_box(Value::from(1))))
    });
}

// ベンチマークグループの定義
criterion_group!(benches, bench_emit, bench_notice);
criterion_main!(benches);
