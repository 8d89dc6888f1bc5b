use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::{ProbeError, ToolError};
use crate::planning::{AudioSource, PanMotion, TimeWindow, ZoomMotion};
use crate::timeline::Resolution;

/// Measured properties of a source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Frames per second
    pub fps: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Whether the file carries at least one audio stream
    pub has_audio: bool,

    /// Video stream dimensions, when reported
    pub resolution: Option<Resolution>,
}

/// One artifact-producing operation handed to the transcoder
#[derive(Debug, Clone, PartialEq)]
pub enum StageOperation {
    /// Cut the source to the resolved time window
    Trim(TimeWindow),

    /// Replace the clip's audio track
    AttachAudio(AudioSource),

    /// Time-scale video and audio together
    ChangeSpeed { factor: f64 },

    Zoom(ZoomMotion),

    Pan(PanMotion),

    /// Normalize to the timeline-wide resolution
    Rescale { target: Resolution },
}

impl StageOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trim(_) => "trim",
            Self::AttachAudio(_) => "audio",
            Self::ChangeSpeed { .. } => "speed",
            Self::Zoom(_) => "zoom",
            Self::Pan(_) => "pan",
            Self::Rescale { .. } => "rescale",
        }
    }
}

/// Probe, transform and concat capabilities of an external media tool
///
/// Implementations must be cheap to share across the per-clip workers; every
/// method is expected to enforce its own timeout.
pub trait MediaBackend: Send + Sync + 'static {
    /// Backend name
    fn name(&self) -> &str;

    /// Check if the backend's tools are usable on this system
    fn is_available(&self) -> bool;

    /// Measure frame rate, duration and streams of a source
    fn probe(&self, path: &Path) -> impl Future<Output = Result<SourceInfo, ProbeError>> + Send;

    /// Produce `output` by applying `operation` to `input`
    fn transform(
        &self,
        input: &Path,
        operation: &StageOperation,
        output: &Path,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Join `inputs` in order into `output`
    fn concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;
}
