//! Lock-free parameter store shared by the control and producer threads.
//!
//! Every field is its own atomic. There is no cross-field transaction: a
//! reader may see a new high-pass cutoff before the compensating low-pass
//! write lands. Readers tolerate that; the cascade stays stable for any pair
//! of positive cutoffs.
//!
//! Validation happens in the setters, so nothing invalid is ever published.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::io::DeviceId;

pub const DEFAULT_VOLUME: f32 = 0.5;
pub const DEFAULT_HIGHPASS_HZ: f32 = 1000.0;
pub const DEFAULT_LOWPASS_HZ: f32 = 4000.0;

pub const MAX_VOLUME: f32 = 2.0;
pub const MIN_HIGHPASS_HZ: f32 = 10.0;
/// Minimum distance between the high-pass and low-pass cutoffs.
pub const BAND_MARGIN_HZ: f32 = 10.0;
pub const MAX_CUTOFF_HZ: f32 = 20_000.0;

/// `f32` stored as its bit pattern.
#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// Values read once per block by the producer thread.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub volume: f32,
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub device: DeviceId,
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            highpass_hz: DEFAULT_HIGHPASS_HZ,
            lowpass_hz: DEFAULT_LOWPASS_HZ,
            device: DeviceId::Analog,
        }
    }
}

#[derive(Debug)]
pub struct ParamStore {
    volume: AtomicF32,
    highpass_hz: AtomicF32,
    lowpass_hz: AtomicF32,
    device: AtomicU8,
    running: AtomicBool,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::from_snapshot(ParamSnapshot::default())
    }

    /// Start from `initial`, validated the same way as a runtime write.
    pub fn from_snapshot(initial: ParamSnapshot) -> Self {
        let defaults = ParamSnapshot::default();
        let store = Self {
            volume: AtomicF32::new(defaults.volume),
            highpass_hz: AtomicF32::new(defaults.highpass_hz),
            lowpass_hz: AtomicF32::new(defaults.lowpass_hz),
            device: AtomicU8::new(initial.device as u8),
            running: AtomicBool::new(true),
        };
        store.set_volume(initial.volume);
        store.set_highpass_hz(initial.highpass_hz);
        store.set_lowpass_hz(initial.lowpass_hz);
        store
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn highpass_hz(&self) -> f32 {
        self.highpass_hz.load()
    }

    pub fn lowpass_hz(&self) -> f32 {
        self.lowpass_hz.load()
    }

    pub fn device(&self) -> DeviceId {
        DeviceId::from_u8(self.device.load(Ordering::Relaxed))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Field-by-field read; may observe a torn cutoff pair.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            volume: self.volume(),
            highpass_hz: self.highpass_hz(),
            lowpass_hz: self.lowpass_hz(),
            device: self.device(),
        }
    }

    /// Clamps to `[0, MAX_VOLUME]`. Non-finite writes are dropped.
    /// Returns the value now stored.
    pub fn set_volume(&self, volume: f32) -> f32 {
        if !volume.is_finite() {
            return self.volume();
        }
        let volume = volume.clamp(0.0, MAX_VOLUME);
        self.volume.store(volume);
        volume
    }

    /// Clamps to `[MIN_HIGHPASS_HZ, MAX_CUTOFF_HZ - BAND_MARGIN_HZ]` and pushes
    /// the low-pass cutoff up if the band would collapse.
    pub fn set_highpass_hz(&self, hz: f32) -> f32 {
        if !hz.is_finite() {
            return self.highpass_hz();
        }
        let hz = hz.clamp(MIN_HIGHPASS_HZ, MAX_CUTOFF_HZ - BAND_MARGIN_HZ);
        self.highpass_hz.store(hz);

        let floor = hz + BAND_MARGIN_HZ;
        if self.lowpass_hz() < floor {
            self.lowpass_hz.store(floor);
        }
        hz
    }

    /// Clamps to `[highpass + BAND_MARGIN_HZ, MAX_CUTOFF_HZ]`.
    pub fn set_lowpass_hz(&self, hz: f32) -> f32 {
        if !hz.is_finite() {
            return self.lowpass_hz();
        }
        let floor = self.highpass_hz() + BAND_MARGIN_HZ;
        let hz = hz.clamp(floor, MAX_CUTOFF_HZ);
        self.lowpass_hz.store(hz);
        hz
    }

    pub fn set_device(&self, device: DeviceId) {
        self.device.store(device as u8, Ordering::Relaxed);
    }

    /// Select the other output. Returns the newly selected device.
    pub fn toggle_device(&self) -> DeviceId {
        let next = self.device().other();
        self.set_device(next);
        next
    }

    pub fn adjust_volume(&self, delta: f32) -> f32 {
        self.set_volume(self.volume() + delta)
    }

    pub fn adjust_highpass_hz(&self, delta: f32) -> f32 {
        self.set_highpass_hz(self.highpass_hz() + delta)
    }

    pub fn adjust_lowpass_hz(&self, delta: f32) -> f32 {
        self.set_lowpass_hz(self.lowpass_hz() + delta)
    }

    /// Request shutdown. The producer drains, closes and returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn defaults() {
        let params = ParamStore::new();
        assert_eq!(params.volume(), 0.5);
        assert_eq!(params.highpass_hz(), 1000.0);
        assert_eq!(params.lowpass_hz(), 4000.0);
        assert_eq!(params.device(), DeviceId::Analog);
        assert!(params.is_running());
    }

    #[test]
    fn highpass_floor_is_exact() {
        let params = ParamStore::new();
        assert_eq!(params.set_highpass_hz(3.0), 10.0);
        assert_eq!(params.highpass_hz(), 10.0);
        assert_eq!(params.set_highpass_hz(-500.0), 10.0);
    }

    #[test]
    fn volume_is_clamped() {
        let params = ParamStore::new();
        assert_eq!(params.set_volume(7.5), 2.0);
        assert_eq!(params.volume(), 2.0);
        assert_eq!(params.set_volume(-1.0), 0.0);
    }

    #[test]
    fn lowpass_floor_tracks_highpass() {
        let params = ParamStore::new();
        params.set_highpass_hz(1000.0);
        assert_eq!(params.set_lowpass_hz(200.0), 1010.0);
        assert_eq!(params.lowpass_hz(), 1010.0);
    }

    #[test]
    fn raising_highpass_drags_lowpass_along() {
        let params = ParamStore::new();
        params.set_lowpass_hz(1200.0);
        params.set_highpass_hz(1500.0);
        assert_eq!(params.highpass_hz(), 1500.0);
        assert_eq!(params.lowpass_hz(), 1510.0);
    }

    #[test]
    fn cutoffs_are_capped() {
        let params = ParamStore::new();
        assert_eq!(params.set_lowpass_hz(96_000.0), MAX_CUTOFF_HZ);
        assert_eq!(
            params.set_highpass_hz(50_000.0),
            MAX_CUTOFF_HZ - BAND_MARGIN_HZ
        );
        assert_eq!(params.lowpass_hz(), MAX_CUTOFF_HZ);
    }

    #[test]
    fn non_finite_writes_are_rejected() {
        let params = ParamStore::new();
        assert_eq!(params.set_volume(f32::NAN), 0.5);
        assert_eq!(params.set_highpass_hz(f32::INFINITY), 1000.0);
        assert_eq!(params.set_lowpass_hz(f32::NAN), 4000.0);
    }

    #[test]
    fn step_adjustments_saturate() {
        let params = ParamStore::new();
        for _ in 0..100 {
            params.adjust_volume(0.05);
        }
        assert_eq!(params.volume(), 2.0);
        for _ in 0..200 {
            params.adjust_highpass_hz(-10.0);
        }
        assert_eq!(params.highpass_hz(), 10.0);
        for _ in 0..100 {
            params.adjust_lowpass_hz(-100.0);
        }
        assert_eq!(params.lowpass_hz(), 20.0);
    }

    #[test]
    fn initial_snapshot_is_validated() {
        let params = ParamStore::from_snapshot(ParamSnapshot {
            volume: 9.0,
            highpass_hz: 2.0,
            lowpass_hz: 5.0,
            device: DeviceId::Digital,
        });
        assert_eq!(params.volume(), 2.0);
        assert_eq!(params.highpass_hz(), 10.0);
        assert_eq!(params.lowpass_hz(), 20.0);
        assert_eq!(params.device(), DeviceId::Digital);
    }

    #[test]
    fn toggle_and_stop() {
        let params = ParamStore::new();
        assert_eq!(params.toggle_device(), DeviceId::Digital);
        assert_eq!(params.toggle_device(), DeviceId::Analog);
        params.stop();
        assert!(!params.is_running());
    }

    #[test]
    fn concurrent_reader_never_sees_invalid_values() {
        let params = Arc::new(ParamStore::new());
        let reader = {
            let params = params.clone();
            thread::spawn(move || {
                for _ in 0..50_000 {
                    let snap = params.snapshot();
                    assert!((0.0..=MAX_VOLUME).contains(&snap.volume));
                    assert!(snap.highpass_hz >= MIN_HIGHPASS_HZ);
                    assert!(snap.lowpass_hz > 0.0 && snap.lowpass_hz <= MAX_CUTOFF_HZ);
                }
            })
        };

        for i in 0..50_000 {
            params.adjust_volume(if i % 2 == 0 { 0.05 } else { -0.05 });
            params.set_highpass_hz((i % 2000) as f32);
            params.set_lowpass_hz((i % 5000) as f32);
        }
        reader.join().unwrap();
    }
}
