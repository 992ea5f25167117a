//! Benchmarks for the noise pipeline.
//!
//! Run with: cargo bench
//!
//! Block production must finish well inside the device deadline. At 48kHz:
//!   - 256 samples  = 5.33ms deadline
//!   - 1024 samples = 21.33ms deadline
//!
//! Benchmark groups:
//!   - dsp/noise     Raw generators
//!   - dsp/filter    One-pole cascade
//!   - dsp/pipeline  Full block render (noise → filter → volume → i16)

use criterion::{criterion_group, criterion_main};

mod dsp;

/// Block sizes around the fixed output block.
pub const BLOCK_SIZES: &[usize] = &[256, 512, 1024, 2048];

criterion_group!(
    benches,
    dsp::bench_noise,
    dsp::bench_filter,
    dsp::bench_pipeline,
);
criterion_main!(benches);
