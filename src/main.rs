//! vox-render - turns captured text-to-speech responses into WAV files
//!
//! Reads a synthesis response, packages the audio as a downloadable WAV and
//! optionally plays it on the default output device.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vox_render::artifact::{ArtifactHandle, BlobStore};
use vox_render::backends::{self, VoicePreset};
use vox_render::config_loader::{self, Settings};
use vox_render::engine::AudioEngine;
use vox_render::error::PlaybackError;
use vox_render::output::RodioDevice;
use vox_render::playback::{PlaybackDevice, PlaybackState, PlaybackStatus};
use vox_render::transport::PcmBuffer;
use vox_render::wav::WavFormat;

/// Turns captured text-to-speech responses into playable WAV files
#[derive(Parser)]
#[command(name = "vox-render")]
#[command(version)]
#[command(about = "Decode, package and play text-to-speech audio", long_about = None)]
struct Cli {
    /// Settings file to use instead of the default search path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a captured synthesis response to a WAV file
    Render {
        /// Response file ({"payload","voice"} or a Gemini response body); stdin if omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Voice to assume when the response does not name one
        #[arg(short, long, value_enum)]
        voice: Option<VoicePreset>,
        /// Directory to write the download file into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Play the result after writing it
        #[arg(short, long)]
        play: bool,
    },

    /// Wrap raw 16-bit PCM in a WAV container
    Encode {
        /// Raw little-endian PCM file
        pcm: PathBuf,
        /// Output path (defaults to the download name in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play a WAV file, Enter toggles pause
    Play {
        /// WAV file to play
        file: PathBuf,
    },

    /// Show the format of a WAV file
    Inspect {
        /// WAV file to inspect
        file: PathBuf,
    },

    /// List available voices
    Voices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vox_render=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => config_loader::SETTINGS
            .read()
            .map_err(|_| anyhow!("Settings lock poisoned"))?
            .clone(),
    };

    match cli.command {
        Commands::Render {
            input,
            voice,
            output_dir,
            play,
        } => {
            let text = read_input(input.as_deref())?;
            let voice = voice.unwrap_or_else(|| settings.voice());
            let response = backends::parse_response(&text, voice)
                .context("Failed to read synthesis response")?;

            let store = BlobStore::new();
            let dir = output_dir.unwrap_or_else(|| settings.output_dir());

            if play {
                let device = RodioDevice::open(store.resolver(), settings.playback_volume)?;
                let mut engine = AudioEngine::new(WavFormat::from(&settings), store, device);
                engine.render(response).context("Failed to generate audio")?;
                report_saved(engine.save_download(&dir, &settings.download_file_name)?);
                run_player(&mut engine, &settings).await?;
                engine.shutdown();
            } else {
                let mut engine = AudioEngine::new(WavFormat::from(&settings), store, NoDevice);
                engine.render(response).context("Failed to generate audio")?;
                report_saved(engine.save_download(&dir, &settings.download_file_name)?);
                engine.shutdown();
            }
        }

        Commands::Encode { pcm, output } => {
            let bytes = std::fs::read(&pcm)
                .with_context(|| format!("Failed to read {}", pcm.display()))?;
            let mut engine =
                AudioEngine::new(WavFormat::from(&settings), BlobStore::new(), NoDevice);
            engine
                .render_pcm(&PcmBuffer::from_bytes(bytes))
                .context("Failed to encode PCM")?;

            let (dir, name) = match &output {
                Some(path) => split_output(path)?,
                None => (settings.output_dir(), settings.download_file_name.clone()),
            };
            report_saved(engine.save_download(&dir, &name)?);
            engine.shutdown();
        }

        Commands::Play { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let store = BlobStore::new();
            let device = RodioDevice::open(store.resolver(), settings.playback_volume)?;
            let mut engine = AudioEngine::new(WavFormat::from(&settings), store, device);
            engine.install_wav(bytes)?;
            println!("Playing: {}", file.display());
            run_player(&mut engine, &settings).await?;
            engine.shutdown();
        }

        Commands::Inspect { file } => {
            let reader = hound::WavReader::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let spec = reader.spec();
            let frames = reader.duration();

            println!("{}", file.display());
            println!("─────────────────");
            println!("Sample rate:  {} Hz", spec.sample_rate);
            println!("Channels:     {}", spec.channels);
            println!("Bit depth:    {} ({:?})", spec.bits_per_sample, spec.sample_format);
            println!("Frames:       {}", frames);
            println!(
                "Duration:     {:.2}s",
                frames as f64 / spec.sample_rate.max(1) as f64
            );
        }

        Commands::Voices => {
            println!("Available Voices");
            println!("────────────────");
            for voice in backends::list_voices() {
                println!("  {} ({})", voice.name, voice.description);
            }
        }
    }

    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read {}", p.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn split_output(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid output path: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, name.to_string()))
}

fn report_saved(path: Option<PathBuf>) {
    if let Some(path) = path {
        println!("Saved: {}", path.display());
    }
}

fn print_state(state: PlaybackState) {
    print!("\r{:<8} {:>5.1}%", state.status, state.progress * 100.0);
    let _ = std::io::stdout().flush();
}

/// Drives the player until the stream ends or Ctrl-C.
async fn run_player(
    engine: &mut AudioEngine<BlobStore, RodioDevice>,
    settings: &Settings,
) -> Result<()> {
    if let Some(state) = engine.toggle()? {
        print_state(state);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(settings.progress_interval_ms));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        if let Some(state) = engine.toggle()? {
                            print_state(state);
                        }
                    }
                    _ => stdin_open = false,
                }
            }
            _ = ticker.tick() => {
                let Some(event) = engine.player_mut().device_mut().poll() else {
                    continue;
                };
                if let Some(state) = engine.handle_event(event) {
                    print_state(state);
                    if state.status == PlaybackStatus::Ended {
                        break;
                    }
                }
            }
        }
    }

    println!();
    Ok(())
}

/// Stand-in device for commands that never play.
struct NoDevice;

impl PlaybackDevice for NoDevice {
    fn load(&mut self, _handle: &ArtifactHandle) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        Err(PlaybackError::Device("no output device attached".to_string()))
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }
}
