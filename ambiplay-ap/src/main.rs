//! Audio Player (ambiplay-ap) - Main entry point
//!
//! Plays or renders WAV clips binaurally. Surround and ambisonic clips are
//! convolved with the HRTF banks named in the config file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use ambiplay_ap::audio::clip::render_to_wav;
use ambiplay_ap::audio::{ClipRenderer, CpalBackend, WavFile};
use ambiplay_ap::AppContext;
use ambiplay_common::config::{load_config, LoggingConfig, TomlConfig};
use ambiplay_common::{Orientation, Technique};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ambiplay-ap
#[derive(Parser, Debug)]
#[command(name = "ambiplay-ap")]
#[command(about = "Binaural player for stereo, surround and ambisonic WAV clips")]
#[command(version)]
struct Cli {
    /// Config file (overrides AMBIPLAY_CONFIG and the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a clip on the output device until interrupted
    Play {
        #[command(flatten)]
        clip: ClipArgs,

        /// Output device name (default device if omitted or not found)
        #[arg(short, long)]
        device: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Render a clip to a 16-bit WAV file without a device
    Render {
        #[command(flatten)]
        clip: ClipArgs,

        /// Output file
        output: PathBuf,

        /// Output channels
        #[arg(long, default_value = "2")]
        channels: u16,

        /// Length to render (defaults to the clip length)
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Print the format of a WAV file
    Info {
        file: PathBuf,

        #[arg(short, long, default_value = "default")]
        technique: Technique,
    },
    /// List output devices
    Devices,
}

#[derive(Args, Debug)]
struct ClipArgs {
    /// WAV file to play
    file: PathBuf,

    /// Channel layout: default, ambix, fuma or tbe
    #[arg(short, long, default_value = "default")]
    technique: Technique,

    /// Last two channels are head-locked stereo
    #[arg(long)]
    head_locked: bool,

    /// Gain (overrides the config file)
    #[arg(short, long)]
    gain: Option<f32>,

    /// Listener yaw in degrees
    #[arg(long, default_value = "0")]
    yaw: f32,
}

impl ClipArgs {
    fn load(&self, config: &TomlConfig) -> Result<ClipRenderer> {
        let mut wav = WavFile::new();
        wav.load(&self.file, self.technique)
            .with_context(|| format!("Failed to load {}", self.file.display()))?;

        let half = self.yaw.to_radians() / 2.0;
        let orientation = Orientation::new(half.cos(), 0.0, 0.0, half.sin());
        let gain = self.gain.unwrap_or(config.audio.gain);

        Ok(ClipRenderer::new(wav, self.head_locked, gain)?.with_orientation(orientation))
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ambiplay_ap={0},ambiplay_common={0}", logging.level).into()
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = logging
        .file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Command::Play { clip, device, duration } => play(config, &clip, device.as_deref(), duration).await,
        Command::Render {
            clip,
            output,
            channels,
            seconds,
        } => render(&config, &clip, &output, channels, seconds),
        Command::Info { file, technique } => show_info(&file, technique),
        Command::Devices => {
            for name in CpalBackend::list_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn play(config: TomlConfig, args: &ClipArgs, device: Option<&str>, duration: Option<f64>) -> Result<()> {
    let clip = args.load(&config)?;
    let backend = CpalBackend::new(device).context("Failed to open audio device")?;
    let mut context = AppContext::new(config, Box::new(backend)).context("Failed to set up renderer")?;

    let output = context.play(clip).context("Failed to start playback")?;
    info!("Output: {} on {}", output, context.manager().backend_name());

    let limit = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.clamp(0.0, 1e9))).await,
            None => std::future::pending::<()>().await,
        }
    };
    let shutdown = shutdown_signal();
    tokio::pin!(limit, shutdown);

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = &mut limit => {
                info!("Playback duration reached");
                break;
            }
            _ = report.tick() => {
                let stats = context.manager().stats();
                debug!(
                    "Callbacks: {} ({} silent), generation {}",
                    stats.callbacks, stats.silent_callbacks, stats.generation
                );
            }
        }
    }

    context.stop();
    info!("Playback stopped");
    Ok(())
}

fn render(config: &TomlConfig, args: &ClipArgs, output: &Path, channels: u16, seconds: Option<f64>) -> Result<()> {
    let mut clip = args.load(config)?;
    let mut pipeline = AppContext::build_pipeline(config).context("Failed to load HRTF banks")?;

    let rate = clip.desc().sample_rate;
    let frames = match seconds {
        Some(secs) => (secs.max(0.0) * rate as f64).round() as usize,
        None => clip.frames(),
    };

    let (wav, path) = render_to_wav(&mut clip, &mut pipeline, channels, frames)?;
    wav.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Rendered {} frames to {} ({:?})", frames, output.display(), path);
    Ok(())
}

fn show_info(file: &Path, technique: Technique) -> Result<()> {
    let mut wav = WavFile::new();
    wav.load(file, technique)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    println!("File:        {}", file.display());
    println!("Technique:   {}", wav.technique());
    println!("Channels:    {}", wav.channels());
    println!("Sample rate: {} Hz", wav.sample_rate());
    println!("Frames:      {}", wav.frames());
    println!("Duration:    {:.3} s", wav.duration_secs());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
