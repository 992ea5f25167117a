//! Output session state machine.

/*
Session Lifecycle
=================

                 ┌──────────── back-off ◄─────────┐
                 ▼                                │
  Closed ──► Opening ──► Configured ──► Streaming │
    ▲            │            │            │      │
    │            └────────────┴──► Failed ─┘      │
    │                                      │
    └────────── Draining ◄─────────────────┘
                          (shutdown, device switch, fatal write)

Opening always re-reads the selected device, so a session can never stay bound
to a stale selection after a switch.

Inside Streaming, one block is rendered and written per iteration. The blocking
write is what paces the loop. An underrun is repaired in place with a
re-prepare; any other write error ends the session and the next iteration
opens a fresh one.

The device handle lives in a local `stream` binding. Every path out of a
session, including `?` returns during setup, drops it, which closes the
device.
*/

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(feature = "rtrb")]
use rtrb::Producer;
use tracing::{debug, info, warn};

use crate::dsp::filter::FilterState;
use crate::dsp::noise::NoiseSource;
use crate::io::{AudioBackend, DeviceError, DeviceId, HwParams, PcmStream, WriteError};
use crate::synth::params::ParamStore;
use crate::synth::pipeline::SamplePipeline;
use crate::BLOCK_SIZE;

/// Default wait between failed open attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Granularity of back-off sleeps, so shutdown is not delayed by a full back-off.
const BACKOFF_SLICE: Duration = Duration::from_millis(10);

/// Pause between writes that accepted nothing.
const ZERO_WRITE_PAUSE: Duration = Duration::from_millis(1);

/// Consecutive empty writes after which the device counts as stalled.
const ZERO_WRITE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Closed = 0,
    Opening = 1,
    Configured = 2,
    Streaming = 3,
    Draining = 4,
    Failed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Opening,
            2 => SessionState::Configured,
            3 => SessionState::Streaming,
            4 => SessionState::Draining,
            5 => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Closed => "Closed",
            SessionState::Opening => "Opening",
            SessionState::Configured => "Configured",
            SessionState::Streaming => "Streaming",
            SessionState::Draining => "Draining",
            SessionState::Failed => "Failed",
        }
    }
}

/// Published session state, readable from any thread.
#[derive(Debug)]
pub struct SessionMonitor {
    state: AtomicU8,
    device: AtomicU8,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Closed as u8),
            device: AtomicU8::new(DeviceId::Analog as u8),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Device of the current or most recent session.
    pub fn device(&self) -> DeviceId {
        DeviceId::from_u8(self.device.load(Ordering::Relaxed))
    }

    fn publish(&self, state: SessionState, device: DeviceId) {
        self.device.store(device as u8, Ordering::Relaxed);
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters returned when the manager stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sessions_opened: u64,
    pub open_failures: u64,
    pub underruns_recovered: u64,
    pub fatal_write_errors: u64,
    pub device_switches: u64,
    pub blocks_written: u64,
}

/// Receives a copy of every block written to the device.
///
/// Called on the producer thread; implementations must not block.
pub trait BlockTap: Send {
    fn push_block(&mut self, block: &[i16]);
}

#[cfg(feature = "rtrb")]
impl BlockTap for Producer<f32> {
    fn push_block(&mut self, block: &[i16]) {
        // Drop whatever does not fit; the reader only wants recent audio.
        let n = block.len().min(self.slots());
        if let Ok(chunk) = self.write_chunk_uninit(n) {
            chunk.fill_from_iter(block.iter().map(|&s| s as f32 / 32768.0));
        }
    }
}

/// How far a block got into the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockWrite {
    Complete,
    /// Shutdown or a device switch arrived while the device accepted nothing.
    /// Part of the block may have been written.
    Interrupted,
}

/// Why a streaming session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamExit {
    Shutdown,
    DeviceSwitch,
    Fatal,
}

/// Drives one output device at a time through the session lifecycle.
pub struct SessionManager<B, N> {
    backend: B,
    pipeline: SamplePipeline<N>,
    params: Arc<ParamStore>,
    monitor: Arc<SessionMonitor>,
    tap: Option<Box<dyn BlockTap>>,
    hw: HwParams,
    backoff: Duration,
    block: Vec<i16>,
    stats: SessionStats,
}

impl<B, N> SessionManager<B, N>
where
    B: AudioBackend,
    N: NoiseSource,
{
    pub fn new(backend: B, pipeline: SamplePipeline<N>, params: Arc<ParamStore>) -> Self {
        Self {
            backend,
            pipeline,
            params,
            monitor: Arc::new(SessionMonitor::new()),
            tap: None,
            hw: HwParams::mono_s16(),
            backoff: RECONNECT_BACKOFF,
            block: vec![0; BLOCK_SIZE],
            stats: SessionStats::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<SessionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_tap(mut self, tap: impl BlockTap + 'static) -> Self {
        self.tap = Some(Box::new(tap));
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Request different hardware parameters. The block length follows
    /// `period_frames`.
    pub fn with_hw_params(mut self, hw: HwParams) -> Self {
        self.block = vec![0; hw.period_frames.max(1)];
        self.hw = hw;
        self
    }

    pub fn monitor(&self) -> Arc<SessionMonitor> {
        self.monitor.clone()
    }

    /// Run sessions until the running flag clears. Never fails: device errors
    /// are retried for as long as the process wants audio.
    pub fn run(mut self) -> SessionStats {
        info!("output session manager started");
        let mut bound: Option<DeviceId> = None;

        while self.params.is_running() {
            let device = self.params.device();
            if bound.is_some_and(|previous| previous != device) {
                self.stats.device_switches += 1;
            }
            bound = Some(device);
            self.transition(SessionState::Opening, device);

            let mut stream = match self.open_session(device) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(device = device.label(), error = %err, "failed to open output");
                    self.stats.open_failures += 1;
                    self.transition(SessionState::Failed, device);
                    self.back_off();
                    continue;
                }
            };
            self.stats.sessions_opened += 1;

            let exit = self.stream_blocks(&mut stream, device);
            debug!(device = device.label(), ?exit, "leaving stream loop");

            self.transition(SessionState::Draining, device);
            if let Err(err) = stream.drain() {
                debug!(device = device.label(), error = %err, "drain failed");
            }
            drop(stream);
            self.transition(SessionState::Closed, device);
        }

        self.transition(SessionState::Closed, bound.unwrap_or(DeviceId::Analog));
        let stats = self.stats;
        info!(?stats, "output session manager stopped");
        stats
    }

    fn transition(&self, state: SessionState, device: DeviceId) {
        debug!(device = device.label(), state = state.label(), "session transition");
        self.monitor.publish(state, device);
    }

    /// Opening → Configured → prepared. The stream is dropped (closed) on any
    /// error.
    fn open_session(&mut self, device: DeviceId) -> Result<B::Stream, DeviceError> {
        let mut stream = self.backend.open(device)?;
        let negotiated = stream.configure(&self.hw)?;
        if negotiated != self.hw {
            debug!(?negotiated, requested = ?self.hw, "device adjusted hardware parameters");
        }
        self.transition(SessionState::Configured, device);
        stream.prepare()?;
        Ok(stream)
    }

    fn stream_blocks(&mut self, stream: &mut B::Stream, device: DeviceId) -> StreamExit {
        // Fresh filter memory for every stream.
        let mut filter = FilterState::new();
        self.transition(SessionState::Streaming, device);
        info!(device = device.label(), "streaming");

        loop {
            if !self.params.is_running() {
                return StreamExit::Shutdown;
            }
            if self.params.device() != device {
                return StreamExit::DeviceSwitch;
            }

            let snapshot = self.params.snapshot();
            self.pipeline.produce_block(&mut self.block, &snapshot, &mut filter);

            match write_all(stream, &self.block, &self.params, device) {
                Ok(BlockWrite::Complete) => {
                    self.stats.blocks_written += 1;
                    if let Some(tap) = self.tap.as_mut() {
                        tap.push_block(&self.block);
                    }
                }
                // The checks at the top of the loop pick the exit.
                Ok(BlockWrite::Interrupted) => {}
                Err(WriteError::Underrun) => {
                    debug!(device = device.label(), "underrun, re-preparing");
                    if let Err(err) = stream.prepare() {
                        warn!(device = device.label(), error = %err, "re-prepare after underrun failed");
                        self.stats.fatal_write_errors += 1;
                        return StreamExit::Fatal;
                    }
                    self.stats.underruns_recovered += 1;
                }
                Err(err) => {
                    warn!(device = device.label(), error = %err, "write failed, reconnecting");
                    self.stats.fatal_write_errors += 1;
                    return StreamExit::Fatal;
                }
            }
        }
    }

    fn back_off(&self) {
        let mut remaining = self.backoff;
        while !remaining.is_zero() && self.params.is_running() {
            let step = remaining.min(BACKOFF_SLICE);
            thread::sleep(step);
            remaining -= step;
        }
    }
}

/// Write a whole block, following short writes. A write that accepts nothing
/// is retried briefly; it interrupts the block when shutdown or a device
/// switch is pending and fails as stalled once it has gone on too long.
fn write_all<S: PcmStream>(
    stream: &mut S,
    block: &[i16],
    params: &ParamStore,
    device: DeviceId,
) -> Result<BlockWrite, WriteError> {
    let mut offset = 0;
    let mut empty_writes = 0;
    while offset < block.len() {
        let written = stream.write(&block[offset..])?;
        if written > 0 {
            offset += written;
            empty_writes = 0;
            continue;
        }

        if !params.is_running() || params.device() != device {
            return Ok(BlockWrite::Interrupted);
        }
        empty_writes += 1;
        if empty_writes >= ZERO_WRITE_LIMIT {
            return Err(WriteError::Stalled);
        }
        thread::sleep(ZERO_WRITE_PAUSE);
    }
    Ok(BlockWrite::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::noise::XorShift32;
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;
    use std::rc::Rc;

    /// Accepts at most `chunk` frames per write.
    struct ShortWrites {
        chunk: usize,
        calls: Rc<Cell<usize>>,
    }

    impl PcmStream for ShortWrites {
        fn configure(&mut self, requested: &HwParams) -> Result<HwParams, DeviceError> {
            Ok(*requested)
        }

        fn prepare(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn write(&mut self, frames: &[i16]) -> Result<usize, WriteError> {
            self.calls.set(self.calls.get() + 1);
            Ok(frames.len().min(self.chunk))
        }

        fn drain(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[test]
    fn write_all_follows_short_writes() {
        let calls = Rc::new(Cell::new(0));
        let mut stream = ShortWrites {
            chunk: 300,
            calls: calls.clone(),
        };
        let params = ParamStore::new();
        let outcome = write_all(&mut stream, &[0; 1024], &params, DeviceId::Analog).unwrap();
        assert_eq!(outcome, BlockWrite::Complete);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn write_all_stops_on_zero_write_during_shutdown() {
        let calls = Rc::new(Cell::new(0));
        let mut stream = ShortWrites {
            chunk: 0,
            calls: calls.clone(),
        };
        let params = ParamStore::new();
        params.stop();
        let outcome = write_all(&mut stream, &[0; 1024], &params, DeviceId::Analog).unwrap();
        assert_eq!(outcome, BlockWrite::Interrupted);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn write_all_reports_stall_when_device_accepts_nothing() {
        let calls = Rc::new(Cell::new(0));
        let mut stream = ShortWrites {
            chunk: 0,
            calls: calls.clone(),
        };
        let params = ParamStore::new();
        let result = write_all(&mut stream, &[0; 1024], &params, DeviceId::Analog);
        assert!(matches!(result, Err(WriteError::Stalled)));
        assert_eq!(calls.get(), ZERO_WRITE_LIMIT);
    }

    #[test]
    fn write_all_yields_to_device_switch_when_device_accepts_nothing() {
        let calls = Rc::new(Cell::new(0));
        let mut stream = ShortWrites {
            chunk: 0,
            calls: calls.clone(),
        };
        let params = ParamStore::new();
        params.set_device(DeviceId::Digital);
        let outcome = write_all(&mut stream, &[0; 1024], &params, DeviceId::Analog).unwrap();
        assert_eq!(outcome, BlockWrite::Interrupted);
        assert_eq!(calls.get(), 1);
    }

    /// Accepts the first 100 frames, then requests shutdown and accepts nothing.
    struct StopsMidBlock {
        params: Arc<ParamStore>,
        writes: usize,
    }

    impl PcmStream for StopsMidBlock {
        fn configure(&mut self, requested: &HwParams) -> Result<HwParams, DeviceError> {
            Ok(*requested)
        }

        fn prepare(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn write(&mut self, frames: &[i16]) -> Result<usize, WriteError> {
            self.writes += 1;
            if self.writes == 1 {
                self.params.stop();
                return Ok(frames.len().min(100));
            }
            Ok(0)
        }

        fn drain(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct StopsMidBlockBackend {
        params: Arc<ParamStore>,
    }

    impl AudioBackend for StopsMidBlockBackend {
        type Stream = StopsMidBlock;

        fn open(&mut self, _device: DeviceId) -> Result<StopsMidBlock, DeviceError> {
            Ok(StopsMidBlock {
                params: self.params.clone(),
                writes: 0,
            })
        }
    }

    struct CountingTap(Arc<AtomicUsize>);

    impl BlockTap for CountingTap {
        fn push_block(&mut self, _block: &[i16]) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn partial_block_at_shutdown_is_not_counted_or_tapped() {
        let params = Arc::new(ParamStore::new());
        let tapped = Arc::new(AtomicUsize::new(0));
        let backend = StopsMidBlockBackend {
            params: params.clone(),
        };
        let stats = SessionManager::new(backend, SamplePipeline::new(XorShift32::default()), params)
            .with_tap(CountingTap(tapped.clone()))
            .run();

        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.blocks_written, 0);
        assert_eq!(stats.fatal_write_errors, 0);
        assert_eq!(tapped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn monitor_round_trips_states() {
        let monitor = SessionMonitor::new();
        assert_eq!(monitor.state(), SessionState::Closed);
        for state in [
            SessionState::Opening,
            SessionState::Configured,
            SessionState::Streaming,
            SessionState::Draining,
            SessionState::Failed,
            SessionState::Closed,
        ] {
            monitor.publish(state, DeviceId::Digital);
            assert_eq!(monitor.state(), state);
            assert_eq!(monitor.device(), DeviceId::Digital);
        }
    }

    struct NoDevices;

    impl AudioBackend for NoDevices {
        type Stream = ShortWrites;

        fn open(&mut self, device: DeviceId) -> Result<ShortWrites, DeviceError> {
            Err(DeviceError::NotFound(device.label().to_string()))
        }
    }

    #[test]
    fn stopped_before_start_returns_immediately() {
        let params = Arc::new(ParamStore::new());
        params.stop();
        let manager = SessionManager::new(NoDevices, SamplePipeline::new(XorShift32::default()), params);
        let monitor = manager.monitor();
        let stats = manager.run();
        assert_eq!(stats, SessionStats::default());
        assert_eq!(monitor.state(), SessionState::Closed);
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn rtrb_tap_drops_overflow() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(8);
        producer.push_block(&[16384; 6]);
        producer.push_block(&[-16384; 6]);

        let mut received = Vec::new();
        while let Ok(sample) = consumer.pop() {
            received.push(sample);
        }
        assert_eq!(received.len(), 8);
        assert_eq!(received[0], 0.5);
        assert_eq!(received[7], -0.5);
    }
}
