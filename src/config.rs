use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Run configuration for the Timeline-Stitcher
///
/// Describes how the external tools are invoked; the timeline itself lives
/// in a separate line-oriented file (see [`crate::timeline::parser`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool locations and timeouts
    pub tools: ToolConfig,

    /// Encoder settings for every re-encoding stage
    pub encoding: EncodingConfig,

    /// Scheduling and scratch-space settings
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string(),
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tools.validate()?;
        self.encoding.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Transcoder executable
    pub ffmpeg: PathBuf,

    /// Probe executable
    pub ffprobe: PathBuf,

    /// Upper bound for a single probe call (seconds)
    pub probe_timeout_secs: u64,

    /// Upper bound for a single transcoding stage (seconds)
    pub stage_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout_secs: 30,
            stage_timeout_secs: 600,
        }
    }
}

impl ToolConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tools.probe_timeout_secs".to_string(),
                value: self.probe_timeout_secs.to_string(),
            }.into());
        }

        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tools.stage_timeout_secs".to_string(),
                value: self.stage_timeout_secs.to_string(),
            }.into());
        }

        Ok(())
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Video codec for re-encoded stages
    pub video_codec: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Encoder preset
    pub preset: String,

    /// Audio codec for re-encoded stages
    pub audio_codec: String,

    /// Sample rate of synthesized silence (Hz)
    pub audio_sample_rate: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 18,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_sample_rate: 48000,
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(ConfigError::InvalidValue {
                key: "encoding.crf".to_string(),
                value: self.crf.to_string(),
            }.into());
        }

        if self.audio_sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoding.audio_sample_rate".to_string(),
                value: self.audio_sample_rate.to_string(),
            }.into());
        }

        Ok(())
    }
}

/// Pipeline scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent directory for the per-run intermediate-artifact root
    pub work_dir: PathBuf,

    /// Number of clips processed concurrently
    pub max_concurrent_clips: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./tmp"),
            max_concurrent_clips: num_cpus::get(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_clips == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.max_concurrent_clips".to_string(),
                value: self.max_concurrent_clips.to_string(),
            }.into());
        }

        Ok(())
    }
}
