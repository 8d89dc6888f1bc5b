use std::fmt;

use thiserror::Error;

/// Main error type for the Timeline-Stitcher library
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Malformed configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Probe failure: {0}")]
    Probe(#[from] ProbeError),

    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and timeline-file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("unknown source '{name}'")]
    UnknownSource { name: String },

    #[error("source '{name}' declared twice")]
    DuplicateSource { name: String },

    #[error("malformed endpoint '{text}'")]
    MalformedEndpoint { text: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("timeline contains no playable clips")]
    EmptyTimeline,
}

impl ConfigError {
    /// Attach the 1-based line number of the offending record
    pub fn at_line(self, line: usize) -> Self {
        Self::AtLine { line, source: Box::new(self) }
    }
}

/// Errors raised while measuring a source with the probe tool
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("unrecognized frame rate '{raw}' for {path}")]
    UnrecognizedFrameRate { path: String, raw: String },

    #[error("invalid measurement for {path}: fps = {fps}, duration = {duration}")]
    InvalidMeasurement { path: String, fps: f64, duration: f64 },

    #[error("no video stream in {path}")]
    MissingVideoStream { path: String },

    #[error("probe of {path} failed: {reason}")]
    ToolFailed { path: String, reason: String },

    #[error("probe of {path} timed out after {secs}s")]
    TimedOut { path: String, secs: u64 },
}

/// Failure of a single external-tool invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("could not start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// Errors raised while deriving zoom/pan parameters for a clip
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("clip {clip}: end resolution has zero width")]
    ZeroWidth { clip: usize },

    #[error("clip {clip}: start and end endpoints disagree on center/resolution")]
    MismatchedEndpoints { clip: usize },

    #[error("clip {clip}: window spans {frames} frames")]
    EmptyWindow { clip: usize, frames: f64 },
}

/// Stage of the per-clip pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Trim,
    Audio,
    Speed,
    Motion,
    Rescale,
}

impl Stage {
    /// Fixed execution order of the per-clip chain
    pub const ORDER: [Stage; 5] = [
        Stage::Trim,
        Stage::Audio,
        Stage::Speed,
        Stage::Motion,
        Stage::Rescale,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Trim => "trim",
            Stage::Audio => "audio",
            Stage::Speed => "speed",
            Stage::Motion => "motion",
            Stage::Rescale => "rescale",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single clip's pipeline failing at one stage
#[derive(Error, Debug, Clone, PartialEq)]
#[error("clip {clip} failed at stage {stage}: {reason}")]
pub struct StageFailure {
    /// Position of the clip in the original timeline
    pub clip: usize,
    pub stage: Stage,
    pub reason: String,
}

/// Run-level pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{} clip(s) failed: {}", .0.len(), describe_failures(.0))]
    ClipsFailed(Vec<StageFailure>),

    #[error("expected {expected} clip artifacts, found {actual}")]
    ArtifactMismatch { expected: usize, actual: usize },

    #[error("concatenation failed: {reason}")]
    ConcatFailed { reason: String },

    #[error("run interrupted")]
    Interrupted,
}

fn describe_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type alias for Results using StitchError
pub type Result<T> = std::result::Result<T, StitchError>;

impl StitchError {
    /// Whether the error concerns a single clip rather than the whole run
    pub fn is_clip_scoped(&self) -> bool {
        matches!(
            self,
            Self::Geometry(_) | Self::Pipeline(PipelineError::ClipsFailed(_))
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Probe(ProbeError::ToolFailed { path, .. }) => {
                format!(
                    "Could not probe '{}'. Check that the file exists and ffprobe is installed.",
                    path
                )
            }
            Self::Pipeline(PipelineError::ClipsFailed(failures)) => failures
                .iter()
                .map(|f| format!("Clip {} failed during {}: {}", f.clip, f.stage, f.reason))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Pipeline(PipelineError::Interrupted) => {
                "Interrupted; intermediate files were removed.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
