use crate::backends::VoicePreset;
use crate::wav::WavFormat;
use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Container format of the upstream PCM
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    // Download surface
    pub download_file_name: String,
    pub output_dir: String,
    pub default_voice: String,
    // Playback
    pub progress_interval_ms: u64,
    pub playback_volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            bits_per_sample: 16,
            channels: 1,
            download_file_name: "voxgemini_output.wav".to_string(),
            output_dir: ".".to_string(),
            default_voice: "Puck".to_string(),
            progress_interval_ms: 250,
            playback_volume: 1.0,
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Falling back to default settings: {}", e);
        Settings::default()
    }));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let user_config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vox-render/VoxRender");

        let builder = Self::defaults()?
            // Merge with local config file (if exists)
            .add_source(File::with_name("VoxRender").required(false))
            .add_source(File::with_name(&user_config.to_string_lossy()).required(false))
            // Merge with environment variables (e.g. VOX_SAMPLE_RATE)
            .add_source(config::Environment::with_prefix("VOX").try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads a single explicit config file on top of the defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self, config::ConfigError> {
        let settings: Settings = Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults(
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let d = Settings::default();
        Config::builder()
            .set_default("sample_rate", d.sample_rate as i64)?
            .set_default("bits_per_sample", d.bits_per_sample as i64)?
            .set_default("channels", d.channels as i64)?
            .set_default("download_file_name", d.download_file_name)?
            .set_default("output_dir", d.output_dir)?
            .set_default("default_voice", d.default_voice)?
            .set_default("progress_interval_ms", d.progress_interval_ms as i64)?
            .set_default("playback_volume", d.playback_volume as f64)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        WavFormat::from(self)
            .validate()
            .map_err(|e| config::ConfigError::Message(format!("Invalid audio format: {}", e)))?;
        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if !self.download_file_name.to_ascii_lowercase().ends_with(".wav")
            || self.download_file_name.contains(['/', '\\'])
        {
            return Err(config::ConfigError::Message(format!(
                "Invalid download_file_name: {}. Must be a bare file name ending in .wav",
                self.download_file_name
            )));
        }
        if self.progress_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "progress_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.default_voice.parse::<VoicePreset>().is_err() {
            return Err(config::ConfigError::Message(format!(
                "Unknown default_voice: {}",
                self.default_voice
            )));
        }
        Ok(())
    }

    pub fn voice(&self) -> VoicePreset {
        self.default_voice.parse().unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}
