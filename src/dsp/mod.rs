//! Low-level DSP primitives used by the sample pipeline.
//!
//! These components are allocation-free and realtime-safe, so the producer
//! thread can own them directly. They stay focused on the signal-processing
//! math; parameter handling lives in [`crate::synth`].

/// Cascaded one-pole high-pass/low-pass filter.
pub mod filter;
/// Raw noise generators (xorshift and OS entropy).
pub mod noise;

pub use filter::{calc_alpha, FilterCoefficients, FilterState};
pub use noise::{EntropyNoise, Noise, NoiseSource, XorShift32};
