//! Benchmarks for full block rendering.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use shaped_noise::{
    dsp::{noise::XorShift32, FilterState},
    synth::{ParamSnapshot, SamplePipeline},
};

use crate::BLOCK_SIZES;

pub fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/pipeline");
    let params = ParamSnapshot::default();

    for &size in BLOCK_SIZES {
        let mut pipeline = SamplePipeline::new(XorShift32::default());
        let mut state = FilterState::new();
        let mut block = vec![0i16; size];

        group.bench_with_input(BenchmarkId::new("produce_block", size), &size, |b, _| {
            b.iter(|| {
                pipeline.produce_block(black_box(&mut block), black_box(&params), &mut state);
            })
        });
    }

    group.finish();
}
