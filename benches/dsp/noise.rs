//! Benchmarks for raw noise generators.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use shaped_noise::dsp::noise::{EntropyNoise, NoiseSource, XorShift32};

use crate::BLOCK_SIZES;

pub fn bench_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/noise");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0i16; size];

        let mut rng = XorShift32::default();
        group.bench_with_input(BenchmarkId::new("xorshift", size), &size, |b, _| {
            b.iter(|| {
                for sample in buffer.iter_mut() {
                    *sample = rng.next_raw();
                }
                black_box(&buffer);
            })
        });

        let mut entropy = EntropyNoise::os(1);
        group.bench_with_input(BenchmarkId::new("os_entropy", size), &size, |b, _| {
            b.iter(|| {
                for sample in buffer.iter_mut() {
                    *sample = entropy.next_raw();
                }
                black_box(&buffer);
            })
        });
    }

    group.finish();
}
