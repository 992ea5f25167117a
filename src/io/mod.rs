// Purpose - output devices, stream negotiation, session lifecycle

#[cfg(feature = "rtrb")]
pub mod cpal_backend;
pub mod session;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{BLOCK_SIZE, BUFFER_BLOCKS, SAMPLE_RATE};

/// The two selectable outputs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceId {
    /// Primary output.
    Analog = 0,
    /// Secondary output.
    Digital = 1,
}

impl DeviceId {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DeviceId::Analog,
            _ => DeviceId::Digital,
        }
    }

    pub fn other(self) -> Self {
        match self {
            DeviceId::Analog => DeviceId::Digital,
            DeviceId::Digital => DeviceId::Analog,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceId::Analog => "Analog",
            DeviceId::Digital => "Digital",
        }
    }
}

/// Sample encodings a stream may be negotiated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    S16,
    U16,
    F32,
}

/// Hardware parameters: requested by the session, answered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub format: PcmFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Frames per write.
    pub period_frames: usize,
    /// Frames the device may hold before a write blocks.
    pub buffer_frames: usize,
}

impl HwParams {
    /// Mono S16 at the fixed rate, buffered `BUFFER_BLOCKS` blocks deep.
    pub fn mono_s16() -> Self {
        Self {
            format: PcmFormat::S16,
            channels: 1,
            sample_rate: SAMPLE_RATE,
            period_frames: BLOCK_SIZE,
            buffer_frames: BLOCK_SIZE * BUFFER_BLOCKS,
        }
    }
}

impl Default for HwParams {
    fn default() -> Self {
        Self::mono_s16()
    }
}

/// Open, configure or teardown failures. All are recoverable by reopening.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("output device `{0}` not found")]
    NotFound(String),
    #[error("failed to enumerate output devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),
    #[error("failed to query configurations of `{device}`: {source}")]
    QueryConfigs {
        device: String,
        #[source]
        source: cpal::SupportedStreamConfigsError,
    },
    #[error("`{device}` does not support {reason}")]
    Unsupported { device: String, reason: String },
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("failed to pause output stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),
    #[error("stream used before it was configured")]
    NotConfigured,
    #[error("{0}")]
    Backend(String),
}

/// Failures from the write path.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The device ran dry. Recover with [`PcmStream::prepare`].
    #[error("buffer underrun")]
    Underrun,
    #[error("output device disconnected")]
    Disconnected,
    #[error("device stopped consuming audio")]
    Stalled,
    #[error("stream used before it was prepared")]
    NotPrepared,
    #[error("{0}")]
    Backend(String),
}

impl WriteError {
    /// Whether the stream can continue after a re-prepare.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WriteError::Underrun)
    }
}

/// Opens output streams by device id.
pub trait AudioBackend {
    type Stream: PcmStream;

    /// Acquire the device. The returned stream holds it until dropped.
    fn open(&mut self, device: DeviceId) -> Result<Self::Stream, DeviceError>;
}

/// An open playback stream. Dropping it closes the device.
pub trait PcmStream {
    /// Negotiate hardware parameters; returns what the device accepted.
    fn configure(&mut self, requested: &HwParams) -> Result<HwParams, DeviceError>;

    /// Make the stream ready to accept writes. Also recovers from underrun.
    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Write mono frames, blocking while the device buffer is full.
    /// Returns how many frames were accepted.
    fn write(&mut self, frames: &[i16]) -> Result<usize, WriteError>;

    /// Block until queued audio has played out.
    fn drain(&mut self) -> Result<(), DeviceError>;
}
