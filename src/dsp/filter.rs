use std::f32::consts::PI;

/*
One-Pole Band Shaping
=====================

Raw white noise is full-band. Two first-order (one-pole) IIR filters in series
carve it into a band:

    noise ──► high-pass ──► low-pass ──► out

| stage     | passes       | rejects      | slope       |
| --------- | ------------ | ------------ | ----------- |
| high-pass | above cutoff | below cutoff | 6 dB/octave |
| low-pass  | below cutoff | above cutoff | 6 dB/octave |

Both stages share one smoothing coefficient formula, the discretized RC
relation:

    dt    = 1 / sample_rate
    rc    = 1 / (2π · cutoff)
    alpha = dt / (rc + dt)

Difference equations (x = input, y = output, [n-1] = previous sample):

    high-pass:  hp[n] = α_hp · (hp[n-1] + x[n] - x[n-1])
    low-pass:   lp[n] = lp[n-1] + α_lp · (hp[n] - lp[n-1])

Higher cutoffs give larger alphas; alpha stays inside (0, 1) for any positive
cutoff, which keeps both recursions stable.
*/

/// Smoothing coefficient for a one-pole stage at `cutoff_hz`.
///
/// `cutoff_hz` must be positive; parameter validation guarantees that before
/// values reach the producer thread.
#[inline]
pub fn calc_alpha(cutoff_hz: f32, sample_rate: f32) -> f32 {
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate;
    dt / (rc + dt)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCoefficients {
    pub alpha_highpass: f32,
    pub alpha_lowpass: f32,
}

impl FilterCoefficients {
    pub fn from_cutoffs(highpass_hz: f32, lowpass_hz: f32, sample_rate: f32) -> Self {
        Self {
            alpha_highpass: calc_alpha(highpass_hz, sample_rate),
            alpha_lowpass: calc_alpha(lowpass_hz, sample_rate),
        }
    }
}

/// Running memory of the cascade. Owned by whichever thread renders audio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    prev_raw: f32,      // x[n-1]
    prev_highpass: f32, // hp[n-1]
    prev_lowpass: f32,  // lp[n-1]
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one sample through high-pass then low-pass.
    #[inline]
    pub fn apply(&mut self, input: f32, coeffs: &FilterCoefficients) -> f32 {
        let hp = coeffs.alpha_highpass * (self.prev_highpass + input - self.prev_raw);
        self.prev_raw = input;
        self.prev_highpass = hp;

        self.prev_lowpass += coeffs.alpha_lowpass * (hp - self.prev_lowpass);
        self.prev_lowpass
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Last low-pass output.
    pub fn output(&self) -> f32 {
        self.prev_lowpass
    }
}
