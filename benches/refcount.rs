//! Handle operation benchmarks
//!
//! Measures the hot paths: clone/drop, mint/release and the script heap
//! round trip.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use euler::ffi;
use euler::{make_handle, make_reference, read_handle, HostType, Object, ScriptHeap};

struct Body {
    mass: f64,
}

impl Object for Body {}

static BODY: HostType = HostType::new::<Body>("Bench::Body");

fn bench_clone_drop(c: &mut Criterion) {
    let body = make_reference(Body { mass: 1.0 });

    c.bench_function("clone_drop", |b| {
        b.iter(|| {
            let copy = black_box(&body).clone();
            drop(black_box(copy));
        });
    });

    let base = body.clone().upcast();
    c.bench_function("cast_to", |b| {
        b.iter(|| black_box(black_box(&base).cast_to::<Body>()));
    });
}

fn bench_mint_release(c: &mut Criterion) {
    let body = make_reference(Body { mass: 2.0 });

    c.bench_function("mint_release", |b| {
        b.iter(|| {
            let token = black_box(&body).mint();
            unsafe { ffi::release(black_box(token)) };
        });
    });

    c.bench_function("mint_reclaim_release", |b| {
        b.iter(|| {
            let token = body.mint();
            let alias = unsafe { ffi::reclaim::<Body>(token) };
            black_box(alias.mass);
            drop(alias);
            unsafe { ffi::release(token) };
        });
    });
}

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_heap");

    for count in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("make_handle_collect", count), &count, |b, &count| {
            let body = make_reference(Body { mass: 3.0 });
            let mut heap = ScriptHeap::new();
            b.iter(|| {
                for _ in 0..count {
                    black_box(make_handle(&mut heap, &body, &BODY));
                }
                heap.collect(&[])
            });
        });
    }

    group.bench_function("read_handle", |b| {
        let body = make_reference(Body { mass: 4.0 });
        let mut heap = ScriptHeap::new();
        let value = make_handle(&mut heap, &body, &BODY);
        b.iter(|| {
            let read = read_handle::<Body, _>(&heap, black_box(&value), &BODY);
            black_box(read.is_ok())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_clone_drop, bench_mint_release, bench_heap);
criterion_main!(benches);
