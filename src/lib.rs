pub mod config;
pub mod dsp; // Noise sources and the one-pole filter cascade
pub mod io; // Output devices and the session state machine
pub mod synth; // Parameter store and block pipeline

pub use config::EngineConfig;

/// Fixed output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Frames produced and written per block.
pub const BLOCK_SIZE: usize = 1024;
/// Requested hardware buffer depth, in blocks.
pub const BUFFER_BLOCKS: usize = 4;
