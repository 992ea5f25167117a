//! shaped-noise - terminal shaped-noise generator
//!
//! Run with: cargo run -- --help

mod app;
mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use shaped_noise::{
    config::NoiseKind, dsp::noise::DEFAULT_SEED, io::cpal_backend::list_output_devices,
    EngineConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shaped-noise", version, about = "Band-shaped white noise with live controls")]
struct Args {
    /// Output used for the Analog selection ("default" = host default)
    #[arg(long, default_value = "default")]
    analog_device: String,

    /// Output used for the Digital selection
    #[arg(long, default_value = "plughw:0,1")]
    digital_device: String,

    /// Seed for the xorshift generator
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u32,

    /// Draw noise from the OS entropy source instead of xorshift
    #[arg(long)]
    entropy: bool,

    /// Write logs here (the terminal belongs to the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print output device names and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    if args.list_devices {
        for name in list_output_devices().wrap_err("failed to list output devices")? {
            println!("{name}");
        }
        return Ok(());
    }

    let noise = if args.entropy {
        NoiseKind::Entropy
    } else {
        NoiseKind::XorShift
    };
    let config = EngineConfig::default()
        .noise(noise)
        .seed(args.seed)
        .analog_device(args.analog_device)
        .digital_device(args.digital_device);

    app::run(config)
}

fn init_logging(path: Option<&Path>) -> EyreResult<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path)
        .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
