//! Thread wiring: producer thread plus the UI on the main thread

use std::sync::Arc;
use std::thread;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use rtrb::RingBuffer;
use tracing::info;

use shaped_noise::{
    io::{
        cpal_backend::CpalBackend,
        session::{SessionManager, SessionMonitor},
    },
    synth::{ParamStore, SamplePipeline},
    EngineConfig, BLOCK_SIZE,
};

use super::ui::ControlSurface;

/// Capacity in blocks for the producer→UI scope ring
const SCOPE_RING_BLOCKS: usize = 8;

/// Run until the operator quits. The producer thread is joined before
/// returning, so the audio device is always released.
pub fn run(config: EngineConfig) -> EyreResult<()> {
    let params = Arc::new(ParamStore::new());
    let monitor = Arc::new(SessionMonitor::new());
    let (scope_tx, scope_rx) = RingBuffer::<f32>::new(BLOCK_SIZE * SCOPE_RING_BLOCKS);

    let manager = SessionManager::new(
        CpalBackend::new(config.devices.clone()).with_cancel(params.clone()),
        SamplePipeline::new(config.make_noise()),
        params.clone(),
    )
    .with_monitor(monitor.clone())
    .with_tap(scope_tx)
    .with_backoff(config.reconnect_backoff);

    let producer = thread::Builder::new()
        .name("noise-producer".into())
        .spawn(move || manager.run())
        .wrap_err("failed to spawn producer thread")?;

    let mut terminal = ratatui::init();
    let ui_result =
        ControlSurface::new(params.clone(), monitor, scope_rx, config.devices).run(&mut terminal);
    ratatui::restore();

    // Whatever ended the UI, stop the producer and wait for it to close the device.
    params.stop();
    let stats = producer
        .join()
        .map_err(|_| eyre!("producer thread panicked"))?;
    info!(?stats, "shut down");

    ui_result
}
