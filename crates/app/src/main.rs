use std::{cell::RefCell, path::PathBuf, rc::Rc};

use clap::{Parser, Subcommand};
use tabviz_core::{
    shared, AppConfig, Behavior, FrameHost, InputMonitor, SampleSource, SilenceSource,
    ToneSource, TrackCursor,
};
use tracing_subscriber::EnvFilter;

fn main() -> tabviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            frames,
            tone,
            play,
        } => run(config.as_ref(), frames, tone, play),
        Commands::Export { config } => export(config.as_ref()),
    }
}

fn load_config(path: Option<&PathBuf>) -> tabviz_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::live_defaults()),
    }
}

/// Host with the input monitor registered strongly and the track cursor
/// registered weakly; the caller keeps the cursor alive to control playback.
fn build_host(
    config: &AppConfig,
    source: Box<dyn SampleSource>,
) -> tabviz_core::Result<(FrameHost, Rc<RefCell<TrackCursor>>)> {
    let mut host = FrameHost::new(&config.frame);
    let monitor = InputMonitor::new(&config.audio, source, host.canvas());
    let cursor = shared(TrackCursor::new(&config.playback, host.canvas()));

    let behaviors = host.behaviors();
    behaviors.add(shared(monitor))?;
    behaviors.add(Rc::downgrade(&cursor))?;
    Ok((host, cursor))
}

fn run(
    config: Option<&PathBuf>,
    frames: u64,
    tone: Option<f32>,
    play: bool,
) -> tabviz_core::Result<()> {
    let mut config = load_config(config)?;
    if let Some(tone) = tone {
        config.audio.tone_hz = tone;
    }

    let source: Box<dyn SampleSource> = if config.audio.tone_hz > 0.0 {
        Box::new(ToneSource::new(
            config.audio.sample_rate,
            config.audio.tone_hz,
            0.25,
        ))
    } else {
        Box::new(SilenceSource::new(config.audio.sample_rate))
    };
    tracing::info!(tone_hz = config.audio.tone_hz, frames, play, "starting session");

    let (mut host, cursor) = build_host(&config, source)?;
    cursor.borrow_mut().set_playing(play);
    host.load_content();
    host.run(frames)?;

    let note = host
        .behaviors()
        .try_find::<InputMonitor>("InputMonitor")?
        .with(|monitor| monitor.current_note());
    match note.flatten() {
        Some(note) => tracing::info!(%note, "last detected note"),
        None => tracing::info!("no note detected"),
    }
    {
        let cursor = cursor.borrow();
        tracing::info!(
            song_time = cursor.song_time(),
            bpm = cursor.bpm(),
            playing = cursor.is_playing(),
            "track position"
        );
    }
    for command in host.canvas().borrow().presented() {
        println!("[{:?}] {}: {}", command.layer, command.source, command.text);
    }

    host.shutdown();
    Ok(())
}

fn export(config: Option<&PathBuf>) -> tabviz_core::Result<()> {
    let config = load_config(config)?;
    let source = Box::new(SilenceSource::new(config.audio.sample_rate));
    let (mut host, cursor) = build_host(&config, source)?;
    host.load_content();

    tracing::debug!(cursor = cursor.borrow().name(), "exporting behaviors");
    println!("{}", host.behaviors().to_json()?);
    host.shutdown();
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Guitar practice tab visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the frame loop against a synthetic input.
    Run {
        /// JSON configuration file; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to run.
        #[arg(short, long, default_value_t = 100)]
        frames: u64,
        /// Frequency of the synthetic input tone in Hz. Zero means silence.
        #[arg(short, long)]
        tone: Option<f32>,
        /// Start with the track cursor playing.
        #[arg(long)]
        play: bool,
    },
    /// Print the registered behaviors as JSON.
    Export {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
