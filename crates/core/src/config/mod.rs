use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, TabVizError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub frame: FrameConfig,
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing sections and fields fall
    /// back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame.fps == 0 {
            return Err(TabVizError::Config("fps must be greater than zero".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(TabVizError::Config(
                "sample rate must be greater than zero".into(),
            ));
        }
        if self.audio.block_size < 2 {
            return Err(TabVizError::Config(
                "block size must hold at least two samples".into(),
            ));
        }
        if self.audio.analysis_window < self.audio.block_size {
            return Err(TabVizError::Config(
                "analysis window must be at least one block long".into(),
            ));
        }
        if self.playback.bpm <= 0.0 {
            return Err(TabVizError::Config("bpm must be positive".into()));
        }
        Ok(())
    }
}

/// Frame loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { fps: 100 }
    }
}

impl FrameConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples pulled per frame; one frame's worth at the default rate.
    pub block_size: usize,
    pub gain: f32,
    /// Frequency of the synthetic input tone.
    pub tone_hz: f32,
    /// Rolling window pitch detection runs over. Several blocks long so low
    /// strings resolve.
    pub analysis_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 480,
            gain: 4.0,
            tone_hz: 110.0,
            analysis_window: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub bpm: f32,
    pub bpm_step: f32,
    pub seek_seconds: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            bpm_step: 0.1,
            seek_seconds: 5.0,
        }
    }
}
