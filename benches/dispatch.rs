use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tick_runtime::{ProbeConfig, RuntimeContext};

fn affinity_pass(c: &mut Criterion) {
    let context = RuntimeContext::from_config(ProbeConfig::default());
    context.affinity().register_current().unwrap();
    let guard = context.affinity();

    c.bench_function("assert_on_authoritative_thread", |b| {
        b.iter(|| guard.assert_on_authoritative_thread(black_box("entity move")))
    });
}

fn copy_dispatch(c: &mut Criterion) {
    let config = ProbeConfig::default().with_vector_facility(true);
    let context = RuntimeContext::from_config(config);
    let capabilities = context.capabilities();

    let small: Vec<i32> = (0..64).collect();
    let large: Vec<i32> = (0..1 << 16).collect();
    let mut dst = vec![0i32; 1 << 16];

    c.bench_function("copy_ints 64", |b| {
        b.iter(|| capabilities.copy_ints(black_box(&small), &mut dst, 0, 64))
    });
    c.bench_function("copy_ints 65536", |b| {
        b.iter(|| capabilities.copy_ints(black_box(&large), &mut dst, 0, 1 << 16))
    });
}

criterion_group!(benches, affinity_pass, copy_dispatch);
criterion_main!(benches);
