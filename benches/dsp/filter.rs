//! Benchmarks for the one-pole cascade.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use shaped_noise::dsp::filter::{FilterCoefficients, FilterState};

use crate::BLOCK_SIZES;

pub fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/filter");
    let coeffs = FilterCoefficients::from_cutoffs(1000.0, 4000.0, 48_000.0);

    for &size in BLOCK_SIZES {
        // Generate a test signal (sawtooth-like ramp)
        let input: Vec<f32> = (0..size)
            .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
            .collect();

        let mut state = FilterState::new();
        group.bench_with_input(BenchmarkId::new("cascade", size), &size, |b, _| {
            b.iter(|| {
                for &x in &input {
                    black_box(state.apply(black_box(x), &coeffs));
                }
            })
        });
    }

    // Recomputed once per block on the producer thread
    group.bench_function("coefficients", |b| {
        b.iter(|| FilterCoefficients::from_cutoffs(black_box(1000.0), black_box(4000.0), 48_000.0))
    });

    group.finish();
}
