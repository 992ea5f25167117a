//! Benchmarks for low-level DSP primitives.

mod filter;
mod noise;
mod pipeline;

pub use filter::bench_filter;
pub use noise::bench_noise;
pub use pipeline::bench_pipeline;
