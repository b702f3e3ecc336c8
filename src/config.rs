//! Engine configuration.
//!
//! Every timing and mixing constant the playback core uses lives here so a
//! practice setup can be tuned from a JSON file without recompiling.

use crate::audio::output::DEFAULT_SAMPLE_RATE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of its usable range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate of the render graph.
    pub sample_rate: u32,
    /// Wall-clock interval between metronome scheduler passes.
    pub scheduler_interval_ms: u64,
    /// How far ahead of the audio clock clicks are scheduled.
    pub lookahead_secs: f64,
    /// Length of one metronome click.
    pub click_duration_secs: f64,
    /// Click pitch on beat 1.
    pub downbeat_hz: f32,
    /// Click pitch on every other beat.
    pub beat_hz: f32,
    /// Slowest allowed playback rate.
    pub min_playback_rate: f64,
    /// Fastest allowed playback rate.
    pub max_playback_rate: f64,
    /// Upper bound for a track's volume (values above 1.0 boost).
    pub max_track_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            scheduler_interval_ms: 25,
            lookahead_secs: 0.1,
            click_duration_secs: 0.05,
            downbeat_hz: 880.0,
            beat_hz: 440.0,
            min_playback_rate: 0.5,
            max_playback_rate: 1.5,
            max_track_volume: 1.5,
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or holds unusable values
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can drive the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.scheduler_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler_interval_ms must be positive".into(),
            ));
        }
        if !(self.lookahead_secs > 0.0) {
            return Err(ConfigError::Invalid("lookahead_secs must be positive".into()));
        }
        if !(self.min_playback_rate > 0.0 && self.min_playback_rate <= self.max_playback_rate) {
            return Err(ConfigError::Invalid(format!(
                "playback rate range [{}, {}] is empty",
                self.min_playback_rate, self.max_playback_rate
            )));
        }
        if !(self.max_track_volume >= 0.0) {
            return Err(ConfigError::Invalid(
                "max_track_volume must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Returns the metronome tick interval as a duration.
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }
}
