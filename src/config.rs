//! Startup configuration.

use std::time::Duration;

use crate::dsp::noise::{EntropyNoise, Noise, XorShift32, DEFAULT_SEED};
use crate::io::session::RECONNECT_BACKOFF;
use crate::io::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseKind {
    #[default]
    XorShift,
    /// OS entropy, with xorshift as fallback.
    Entropy,
}

/// Platform names bound to the two selectable outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNames {
    pub analog: String,
    pub digital: String,
}

impl DeviceNames {
    pub fn name(&self, id: DeviceId) -> &str {
        match id {
            DeviceId::Analog => &self.analog,
            DeviceId::Digital => &self.digital,
        }
    }
}

impl Default for DeviceNames {
    fn default() -> Self {
        Self {
            analog: "default".to_string(),
            digital: "plughw:0,1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub noise: NoiseKind,
    pub seed: u32,
    pub devices: DeviceNames,
    pub reconnect_backoff: Duration,
}

impl EngineConfig {
    pub fn noise(mut self, noise: NoiseKind) -> Self {
        self.noise = noise;
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn analog_device(mut self, name: impl Into<String>) -> Self {
        self.devices.analog = name.into();
        self
    }

    pub fn digital_device(mut self, name: impl Into<String>) -> Self {
        self.devices.digital = name.into();
        self
    }

    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Build the configured noise generator.
    pub fn make_noise(&self) -> Noise {
        match self.noise {
            NoiseKind::XorShift => Noise::XorShift(XorShift32::new(self.seed)),
            NoiseKind::Entropy => Noise::Entropy(Box::new(EntropyNoise::os(self.seed))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noise: NoiseKind::XorShift,
            seed: DEFAULT_SEED,
            devices: DeviceNames::default(),
            reconnect_backoff: RECONNECT_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::noise::NoiseSource;

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfig::default()
            .seed(7)
            .digital_device("hw:1,0")
            .reconnect_backoff(Duration::from_millis(5));

        assert_eq!(config.seed, 7);
        assert_eq!(config.devices.name(DeviceId::Analog), "default");
        assert_eq!(config.devices.name(DeviceId::Digital), "hw:1,0");
        assert_eq!(config.reconnect_backoff, Duration::from_millis(5));
    }

    #[test]
    fn xorshift_noise_follows_seed() {
        let config = EngineConfig::default().seed(9);
        let mut a = config.make_noise();
        let mut b = XorShift32::new(9);
        for _ in 0..32 {
            assert_eq!(a.next_raw(), b.next_raw());
        }
    }

    #[test]
    fn entropy_kind_builds_entropy_source() {
        let config = EngineConfig::default().noise(NoiseKind::Entropy);
        assert!(matches!(config.make_noise(), Noise::Entropy(_)));
    }
}
