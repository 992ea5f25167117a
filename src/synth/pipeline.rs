//! Noise → filter cascade → volume → 16-bit PCM.

use crate::dsp::filter::{FilterCoefficients, FilterState};
use crate::dsp::noise::NoiseSource;
use crate::synth::params::ParamSnapshot;
use crate::SAMPLE_RATE;

/// Full-scale multiplier from `[-1, 1]` floats to 16-bit PCM.
const FULL_SCALE: f32 = 32767.0;

/// Center a raw sample symmetrically around zero, into `[-1, 1)`.
#[inline]
pub fn center(raw: i16) -> f32 {
    raw as f32 / 32768.0
}

/// Apply volume and convert to PCM, saturating at the 16-bit range.
#[inline]
pub fn scale_to_i16(sample: f32, volume: f32) -> i16 {
    (sample * volume * FULL_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Renders blocks of shaped noise.
///
/// The pipeline owns the noise generator but not the filter memory: the
/// caller keeps a [`FilterState`] per output stream and lends it per block.
pub struct SamplePipeline<N> {
    noise: N,
    sample_rate: f32,
}

impl<N: NoiseSource> SamplePipeline<N> {
    pub fn new(noise: N) -> Self {
        Self::with_sample_rate(noise, SAMPLE_RATE as f32)
    }

    pub fn with_sample_rate(noise: N, sample_rate: f32) -> Self {
        Self { noise, sample_rate }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn next_sample(
        &mut self,
        state: &mut FilterState,
        coeffs: &FilterCoefficients,
        volume: f32,
    ) -> i16 {
        let input = center(self.noise.next_raw());
        let filtered = state.apply(input, coeffs);
        scale_to_i16(filtered, volume)
    }

    /// Fill `out` with the next `out.len()` samples.
    ///
    /// Coefficients and volume come from `params` and hold for the whole
    /// block.
    pub fn produce_block(&mut self, out: &mut [i16], params: &ParamSnapshot, state: &mut FilterState) {
        let coeffs =
            FilterCoefficients::from_cutoffs(params.highpass_hz, params.lowpass_hz, self.sample_rate);
        let volume = params.volume;

        for sample in out.iter_mut() {
            *sample = self.next_sample(state, &coeffs, volume);
        }
    }
}
