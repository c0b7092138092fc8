// riffbox - search the catalog, queue up previews, play them
// Wires config, logging, the player service and the collections into the shell

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use riffbox::audio::{AudioConfig, PlaybackController, PlayerHandle, PlayerService, SimulatedOutput};
use riffbox::collections::{CollectionsStore, JsonFileStorage};
use riffbox::config::Config;
use riffbox::ui::Shell;

#[derive(Parser)]
#[command(name = "riffbox")]
#[command(about = "Search a music catalog and play 30-second previews from the terminal")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/riffbox/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where liked songs and playlists are kept
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// No sound device; playback runs on a simulated clock
    #[arg(long)]
    headless: bool,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

fn init_logging(config: &Config, dev: bool) -> Result<WorkerGuard> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "riffbox.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG beats the config file, which beats the built-in default
    let default_filter = config
        .logging
        .filter
        .clone()
        .unwrap_or_else(|| "info,riffbox=debug".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if dev {
        eprintln!("Dev mode: logging to stderr and {}", log_dir.display());
    }

    Ok(guard)
}

fn spawn_controller<O>(output: O, audio: &AudioConfig) -> PlayerHandle
where
    O: riffbox::audio::AudioOutput + 'static,
{
    let mut controller = PlaybackController::new(output, audio.preview_length());
    controller.set_volume(audio.volume());
    PlayerService::spawn(controller)
}

#[cfg_attr(not(feature = "audio"), allow(unused_variables))]
fn spawn_player(audio: &AudioConfig, headless: bool) -> PlayerHandle {
    #[cfg(feature = "audio")]
    if !headless {
        match riffbox::audio::RodioOutput::new(audio.volume(), audio.tick_interval()) {
            Ok(output) => return spawn_controller(output, audio),
            Err(e) => warn!("Could not open audio device ({}), falling back to headless mode", e),
        }
    }

    info!("Running headless on a simulated clock");
    let output = SimulatedOutput::with_media_duration(audio.preview_length());
    // Detached; lives as long as the runtime
    output.device().spawn_clock(audio.tick_interval());
    spawn_controller(output, audio)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config - falls back to defaults if missing
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let _log_guard = init_logging(&config, args.dev)?;
    info!("riffbox {} starting up", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.data_dir.display());

    let collections = CollectionsStore::open(JsonFileStorage::new(config.data_dir.clone()));
    let player = spawn_player(&config.audio, args.headless);

    #[allow(unused_mut)]
    let mut shell = Shell::new(player, collections);

    #[cfg(feature = "catalog")]
    match riffbox::catalog::CatalogClient::new(config.catalog.clone()) {
        Ok(catalog) => shell = shell.with_catalog(catalog),
        Err(e) => warn!("Search disabled, could not build HTTP client: {}", e),
    }

    shell.run().await?;

    info!("riffbox shut down cleanly");
    Ok(())
}
