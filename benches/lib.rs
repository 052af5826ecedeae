use criterion::{criterion_group, criterion_main};

use fit::*;

criterion_group!(benches_fit, bench_fit_slices, bench_fit_backends);
criterion_main!(benches_fit);
