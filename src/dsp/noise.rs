//! Raw noise generators.

/*
White Noise
===========

White noise is a stream of uncorrelated random samples. Every frequency is
present with equal energy, which is why it sounds like hiss or static. On its
own it is harsh; the filter cascade downstream gives it "color".

Two generators are provided:

  XorShift32    Marsaglia's xorshift with the (13, 17, 5) triple. Three shifts
                and three xors per sample, fully deterministic for a given
                seed. Statistically white enough for audio, useless for
                cryptography.

  EntropyNoise  Draws bytes from the OS entropy source in pool-sized batches.
                If the OS refuses, the samples come from an internal
                XorShift32 until the next refill attempt. Audio never waits on
                entropy.

Each call yields one raw sample: the low 16 bits of the generator output,
reinterpreted as a signed 16-bit value.
*/

use rand::{rngs::OsRng, TryRngCore};

use crate::BLOCK_SIZE;

/// Seed used when none is configured, or when the configured seed is zero.
pub const DEFAULT_SEED: u32 = 123_456_789;

/// Bytes fetched from the OS per refill (one block of 16-bit samples).
const POOL_BYTES: usize = BLOCK_SIZE * 2;

/// A source of raw 16-bit noise samples.
///
/// Implementations must be O(1) and allocation-free per call; they run on
/// the producer thread at audio rate.
pub trait NoiseSource: Send {
    fn next_raw(&mut self) -> i16;
}

/// 32-bit xorshift generator.
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Zero is a fixed point of xorshift, so a zero seed falls back to
    /// [`DEFAULT_SEED`].
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { DEFAULT_SEED } else { seed };
        Self { state }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

impl Default for XorShift32 {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl NoiseSource for XorShift32 {
    #[inline]
    fn next_raw(&mut self) -> i16 {
        (self.next_u32() & 0xFFFF) as u16 as i16
    }
}

/// Noise drawn from an entropy source, with a deterministic fallback.
pub struct EntropyNoise<R = OsRng> {
    rng: R,
    pool: [u8; POOL_BYTES],
    cursor: usize,
    /// Samples left to take from `fallback` before retrying the entropy source.
    fallback_left: usize,
    fallback: XorShift32,
    refill_failures: u64,
}

impl EntropyNoise<OsRng> {
    pub fn os(seed: u32) -> Self {
        Self::with_rng(OsRng, seed)
    }
}

impl<R: TryRngCore> EntropyNoise<R> {
    /// `seed` only drives the fallback generator.
    pub fn with_rng(rng: R, seed: u32) -> Self {
        Self {
            rng,
            pool: [0; POOL_BYTES],
            cursor: POOL_BYTES,
            fallback_left: 0,
            fallback: XorShift32::new(seed),
            refill_failures: 0,
        }
    }

    /// Number of refills the entropy source has refused so far.
    pub fn refill_failures(&self) -> u64 {
        self.refill_failures
    }

    fn refill(&mut self) -> bool {
        match self.rng.try_fill_bytes(&mut self.pool) {
            Ok(()) => {
                self.cursor = 0;
                true
            }
            Err(_) => {
                self.refill_failures += 1;
                self.fallback_left = POOL_BYTES / 2;
                false
            }
        }
    }
}

impl<R: TryRngCore + Send> NoiseSource for EntropyNoise<R> {
    #[inline]
    fn next_raw(&mut self) -> i16 {
        if self.fallback_left > 0 {
            self.fallback_left -= 1;
            return self.fallback.next_raw();
        }
        if self.cursor >= POOL_BYTES && !self.refill() {
            self.fallback_left -= 1;
            return self.fallback.next_raw();
        }
        let bytes = [self.pool[self.cursor], self.pool[self.cursor + 1]];
        self.cursor += 2;
        i16::from_le_bytes(bytes)
    }
}

/// The generator chosen at startup.
///
/// An enum rather than a trait object keeps dispatch static on the hot path.
pub enum Noise {
    XorShift(XorShift32),
    Entropy(Box<EntropyNoise>),
}

impl NoiseSource for Noise {
    #[inline]
    fn next_raw(&mut self) -> i16 {
        match self {
            Noise::XorShift(rng) => rng.next_raw(),
            Noise::Entropy(rng) => rng.next_raw(),
        }
    }
}
