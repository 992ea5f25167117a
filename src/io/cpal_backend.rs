//! Output through cpal, with a blocking write API on top of its callback model.

/*
Blocking Writes over a Pull Callback
====================================

cpal pulls audio from a callback on its own thread; the session manager pushes
blocks. An `rtrb` ring of `buffer_frames` mono samples joins the two:

  producer thread                          cpal callback
  ───────────────                          ─────────────
  write(block) ──► [ ring: 4 blocks ] ──► pop, convert, copy to every channel

  - write() waits in 1 ms steps while the ring is full. This is the pacing:
    the producer runs exactly as fast as the device consumes.
  - The callback never blocks. If the ring runs dry after audio has started,
    it plays silence and raises the underrun flag; the next write() reports
    WriteError::Underrun and prepare() clears it.
  - cpal reports a vanished device through the error callback; that marks the
    stream disconnected and every later write fails.
  - With a cancel handle, a write blocked on a full ring returns 0 frames as
    soon as the parameter store is stopped. drain() stops waiting once the
    device goes two periods without taking anything.

Negotiation prefers mono S16 at the fixed rate. When a device only offers
other layouts at that rate (stereo, f32, u16), the callback converts and
duplicates, the way ALSA's plug layer would.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SizedSample, StreamConfig, StreamError,
    SupportedBufferSize,
};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, warn};

use crate::config::DeviceNames;
use crate::io::{AudioBackend, DeviceError, DeviceId, HwParams, PcmFormat, PcmStream, WriteError};
use crate::synth::params::ParamStore;

/// Name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Names of every output device the default host exposes.
pub fn list_output_devices() -> Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    let devices = host.output_devices()?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn find_device(host: &cpal::Host, name: &str) -> Result<cpal::Device, DeviceError> {
    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| DeviceError::NotFound(name.to_string()));
    }
    host.output_devices()?
        .find(|device| device.name().is_ok_and(|n| n == name))
        .ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

pub struct CpalBackend {
    names: DeviceNames,
    params: Option<Arc<ParamStore>>,
}

impl CpalBackend {
    pub fn new(names: DeviceNames) -> Self {
        Self { names, params: None }
    }

    /// Let blocked writes give up as soon as `params` is stopped.
    pub fn with_cancel(mut self, params: Arc<ParamStore>) -> Self {
        self.params = Some(params);
        self
    }
}

impl AudioBackend for CpalBackend {
    type Stream = CpalStream;

    fn open(&mut self, id: DeviceId) -> Result<CpalStream, DeviceError> {
        let host = cpal::default_host();
        let name = self.names.name(id);
        let device = find_device(&host, name)?;
        debug!(device = name, "opened output device");
        Ok(CpalStream::new(device, name.to_string(), self.params.clone()))
    }
}

#[derive(Debug, Default)]
struct StreamFlags {
    /// Set once the callback has played real audio since the last prepare.
    primed: AtomicBool,
    underrun: AtomicBool,
    disconnected: AtomicBool,
}

impl StreamFlags {
    /// Forget any underrun; the next one only counts after audio flows again.
    fn rearm(&self) {
        self.underrun.store(false, Ordering::Relaxed);
        self.primed.store(false, Ordering::Relaxed);
    }
}

/// Producer side of the ring: blocking writes and the drain wait.
struct RingWriter {
    producer: Producer<i16>,
    flags: Arc<StreamFlags>,
    capacity: usize,
    period_frames: usize,
    sample_rate: u32,
    cancel: Option<Arc<ParamStore>>,
    /// A write gave up on a device that stopped consuming.
    stalled: bool,
}

impl RingWriter {
    fn new(
        producer: Producer<i16>,
        flags: Arc<StreamFlags>,
        hw: &HwParams,
        cancel: Option<Arc<ParamStore>>,
    ) -> Self {
        Self {
            // Empty at construction, so every slot is free.
            capacity: producer.slots(),
            producer,
            flags,
            period_frames: hw.period_frames,
            sample_rate: hw.sample_rate,
            cancel,
            stalled: false,
        }
    }

    /// Time for the device to play `frames`.
    fn duration_of(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|params| !params.is_running())
    }

    fn disconnected(&self) -> bool {
        self.flags.disconnected.load(Ordering::Relaxed)
    }

    fn queued(&self) -> usize {
        self.capacity - self.producer.slots()
    }

    /// Returns `Ok(0)` when cancelled while the ring is full.
    fn write(&mut self, frames: &[i16]) -> Result<usize, WriteError> {
        if self.disconnected() {
            return Err(WriteError::Disconnected);
        }
        if self.flags.underrun.swap(false, Ordering::Relaxed) {
            return Err(WriteError::Underrun);
        }

        let stall_after = self.duration_of(self.capacity * 2);
        let started = Instant::now();
        while self.producer.slots() == 0 {
            if self.disconnected() {
                return Err(WriteError::Disconnected);
            }
            if self.cancelled() {
                return Ok(0);
            }
            if started.elapsed() > stall_after {
                self.stalled = true;
                return Err(WriteError::Stalled);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let n = frames.len().min(self.producer.slots());
        let chunk = self
            .producer
            .write_chunk_uninit(n)
            .map_err(|err| WriteError::Backend(err.to_string()))?;
        Ok(chunk.fill_from_iter(frames.iter().copied()))
    }

    /// Wait for the ring to play out. Gives up at a deadline, or as soon as
    /// two periods pass without the device taking anything.
    fn drain(&mut self) {
        if self.stalled {
            return;
        }
        let deadline = Instant::now() + self.duration_of(self.capacity + self.capacity / 4);
        let patience = self.duration_of(self.period_frames * 2);

        let mut queued = self.queued();
        let mut last_progress = Instant::now();
        while queued > 0 && !self.disconnected() {
            let now = Instant::now();
            if now >= deadline || now.duration_since(last_progress) > patience {
                debug!(queued, "drain gave up with audio still queued");
                break;
            }
            thread::sleep(POLL_INTERVAL);
            let remaining = self.queued();
            if remaining < queued {
                last_progress = Instant::now();
            }
            queued = remaining;
        }
    }
}

pub struct CpalStream {
    device: cpal::Device,
    name: String,
    config: Option<(StreamConfig, SampleFormat)>,
    hw: Option<HwParams>,
    ring: Option<RingWriter>,
    stream: Option<cpal::Stream>,
    flags: Arc<StreamFlags>,
    cancel: Option<Arc<ParamStore>>,
}

impl CpalStream {
    fn new(device: cpal::Device, name: String, cancel: Option<Arc<ParamStore>>) -> Self {
        Self {
            device,
            name,
            config: None,
            hw: None,
            ring: None,
            stream: None,
            flags: Arc::new(StreamFlags::default()),
            cancel,
        }
    }

    fn build(&self, consumer: Consumer<i16>) -> Result<cpal::Stream, DeviceError> {
        let (config, format) = self.config.as_ref().ok_or(DeviceError::NotConfigured)?;
        let flags = self.flags.clone();
        let stream = match format {
            SampleFormat::I16 => build_stream::<i16>(&self.device, config, consumer, flags)?,
            SampleFormat::U16 => build_stream::<u16>(&self.device, config, consumer, flags)?,
            SampleFormat::F32 => build_stream::<f32>(&self.device, config, consumer, flags)?,
            other => {
                return Err(DeviceError::Unsupported {
                    device: self.name.clone(),
                    reason: format!("sample format {other:?}"),
                })
            }
        };
        Ok(stream)
    }
}

impl PcmStream for CpalStream {
    fn configure(&mut self, requested: &HwParams) -> Result<HwParams, DeviceError> {
        let (config, format, negotiated) = negotiate(&self.device, &self.name, requested)?;
        debug!(device = %self.name, ?config, ?format, "negotiated stream configuration");
        self.config = Some((config, format));
        self.hw = Some(negotiated);
        Ok(negotiated)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.flags.rearm();

        if let (Some(stream), Some(ring)) = (&self.stream, self.ring.as_mut()) {
            ring.stalled = false;
            stream.play()?;
            return Ok(());
        }

        let hw = self.hw.ok_or(DeviceError::NotConfigured)?;
        let (producer, consumer) = RingBuffer::<i16>::new(hw.buffer_frames);
        let stream = self.build(consumer)?;
        stream.play()?;

        self.ring = Some(RingWriter::new(producer, self.flags.clone(), &hw, self.cancel.clone()));
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, WriteError> {
        self.ring.as_mut().ok_or(WriteError::NotPrepared)?.write(frames)
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        let Some(ring) = self.ring.as_mut() else {
            return Ok(());
        };
        ring.drain();

        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        // Dropping the cpal stream releases the device.
        self.stream.take();
        debug!(device = %self.name, "closed output device");
    }
}

/// Pick the closest supported layout to `requested` at the requested rate.
fn negotiate(
    device: &cpal::Device,
    name: &str,
    requested: &HwParams,
) -> Result<(StreamConfig, SampleFormat, HwParams), DeviceError> {
    let rate = cpal::SampleRate(requested.sample_rate);
    let ranges = device
        .supported_output_configs()
        .map_err(|source| DeviceError::QueryConfigs {
            device: name.to_string(),
            source,
        })?;

    let best = ranges
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter_map(|range| pcm_format(range.sample_format()).map(|format| (range, format)))
        .min_by_key(|(range, format)| {
            (
                range.channels() != requested.channels,
                *format != requested.format,
                range.channels(),
            )
        })
        .ok_or_else(|| DeviceError::Unsupported {
            device: name.to_string(),
            reason: format!("{} Hz output in S16, U16 or F32", requested.sample_rate),
        })?;

    let (range, format) = best;
    let period = requested.period_frames as u32;
    let buffer_size = match range.buffer_size() {
        SupportedBufferSize::Range { min, max } => BufferSize::Fixed(period.clamp(*min, *max)),
        SupportedBufferSize::Unknown => BufferSize::Default,
    };
    let period_frames = match buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => requested.period_frames,
    };

    let config = StreamConfig {
        channels: range.channels(),
        sample_rate: rate,
        buffer_size,
    };
    let negotiated = HwParams {
        format,
        channels: range.channels(),
        sample_rate: requested.sample_rate,
        period_frames,
        // The ring must hold at least one device period.
        buffer_frames: requested.buffer_frames.max(period_frames * 2),
    };
    Ok((config, range.sample_format(), negotiated))
}

fn pcm_format(format: SampleFormat) -> Option<PcmFormat> {
    match format {
        SampleFormat::I16 => Some(PcmFormat::S16),
        SampleFormat::U16 => Some(PcmFormat::U16),
        SampleFormat::F32 => Some(PcmFormat::F32),
        _ => None,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: Consumer<i16>,
    flags: Arc<StreamFlags>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels.max(1) as usize;
    let error_flags = flags.clone();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            fill_frames(data, channels, &mut consumer, &flags)
        },
        move |err| on_stream_error(&err, &error_flags),
        None,
    )
}

/// Callback body: pop one mono sample per frame and copy it to every channel.
/// A starved frame plays silence, and counts as an underrun once audio has
/// been fed since the last prepare.
fn fill_frames<T>(
    data: &mut [T],
    channels: usize,
    consumer: &mut Consumer<i16>,
    flags: &StreamFlags,
) where
    T: SizedSample + FromSample<i16>,
{
    let mut fed = false;
    let mut starved = false;
    for frame in data.chunks_mut(channels.max(1)) {
        let value = match consumer.pop() {
            Ok(sample) => {
                fed = true;
                sample
            }
            Err(_) => {
                starved = true;
                0
            }
        };
        frame.fill(T::from_sample(value));
    }
    if fed {
        flags.primed.store(true, Ordering::Relaxed);
    }
    if starved && flags.primed.load(Ordering::Relaxed) {
        flags.underrun.store(true, Ordering::Relaxed);
    }
}

fn on_stream_error(err: &StreamError, flags: &StreamFlags) {
    match err {
        StreamError::DeviceNotAvailable => {
            error!("output device no longer available");
            flags.disconnected.store(true, Ordering::Relaxed);
        }
        other => warn!("output stream error: {other}"),
    }
}
