use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ProbeError, Result};
use crate::media::{MediaBackend, SourceInfo};
use crate::timeline::{Resolution, Source, Timeline, TimelineEntry};

/// Half-open time range inside a source, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Outcome of checking a clip's window against its source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validity {
    Valid,

    /// End ran past the source; the window now ends at the source duration
    Clamped { requested_end: f64 },

    /// Start lies past the source's end
    Dropped,
}

impl Validity {
    pub fn is_kept(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

/// A timeline entry resolved against its source's measured properties
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClip {
    /// Position of the entry in the declared timeline
    pub index: usize,
    pub entry: TimelineEntry,
    pub source: Source,
    pub info: SourceInfo,
    pub window: TimeWindow,
    pub validity: Validity,
}

impl ResolvedClip {
    /// Number of source frames covered by the resolved window
    pub fn frame_span(&self) -> f64 {
        match self.validity {
            Validity::Clamped { .. } => {
                self.info.duration * self.info.fps - self.entry.start.frame as f64
            }
            _ => (self.entry.end.frame - self.entry.start.frame) as f64,
        }
    }

    /// Real-time length of the clip once its speed factor is applied
    pub fn effective_duration(&self) -> f64 {
        self.window.duration() / self.entry.speed.factor()
    }

    /// Resolution the clip has after any zoom/pan, before rescaling
    ///
    /// Only a moving framing crops the frame; a static or absent one leaves
    /// the source size untouched.
    pub fn output_resolution(&self) -> Option<Resolution> {
        match (self.entry.start.framing, self.entry.end.framing) {
            (Some(start), Some(end)) if start != end => Some(end.resolution),
            _ => self.info.resolution,
        }
    }
}

/// Timeline after frame-to-time resolution
#[derive(Debug, Clone, Default)]
pub struct ResolvedTimeline {
    /// Playable clips in timeline order
    pub clips: Vec<ResolvedClip>,

    /// Clips whose window starts past the end of their source
    pub dropped: Vec<ResolvedClip>,
}

/// Compute the time window for a frame range and classify it
pub fn resolve_window(start_frame: u64, end_frame: u64, info: &SourceInfo) -> (TimeWindow, Validity) {
    let start = start_frame as f64 / info.fps;
    let end = end_frame as f64 / info.fps;

    if start > info.duration {
        (TimeWindow::new(start, end), Validity::Dropped)
    } else if end > info.duration {
        (TimeWindow::new(start, info.duration), Validity::Clamped { requested_end: end })
    } else {
        (TimeWindow::new(start, end), Validity::Valid)
    }
}

/// Converts frame markers into time offsets using each source's real rate
pub struct FrameTimeResolver<B: MediaBackend> {
    backend: Arc<B>,
}

impl<B: MediaBackend> FrameTimeResolver<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Probe every used source once, then resolve all entries
    pub async fn resolve(&self, timeline: &Timeline) -> Result<ResolvedTimeline> {
        let infos = self.probe_sources(timeline).await?;

        // Phase one marks every clip without touching the sequence.
        let marked: Vec<ResolvedClip> = timeline
            .clips()
            .enumerate()
            .filter_map(|(index, (entry, source))| {
                let info = infos.get(&source.path)?.clone();
                let (window, validity) = resolve_window(entry.start.frame, entry.end.frame, &info);
                Some(ResolvedClip {
                    index,
                    entry: entry.clone(),
                    source: source.clone(),
                    info,
                    window,
                    validity,
                })
            })
            .collect();

        // Phase two keeps the playable ones in their original order.
        let (clips, dropped): (Vec<_>, Vec<_>) =
            marked.into_iter().partition(|clip| clip.validity.is_kept());

        for clip in &clips {
            if let Validity::Clamped { requested_end } = clip.validity {
                warn!(
                    clip = clip.index,
                    "End time {:.3}s exceeds '{}' ({:.3}s); clamped",
                    requested_end, clip.source.name, clip.info.duration
                );
            }
        }
        for clip in &dropped {
            warn!(
                clip = clip.index,
                "Start time {:.3}s is past the end of '{}' ({:.3}s); dropped",
                clip.window.start, clip.source.name, clip.info.duration
            );
        }

        info!(
            "Resolved {} clips ({} dropped) from {} sources",
            clips.len(),
            dropped.len(),
            infos.len()
        );
        Ok(ResolvedTimeline { clips, dropped })
    }

    async fn probe_sources(&self, timeline: &Timeline) -> Result<HashMap<PathBuf, SourceInfo>> {
        let mut tasks = JoinSet::new();
        for path in timeline.used_paths() {
            let backend = Arc::clone(&self.backend);
            let path = path.to_path_buf();
            tasks.spawn(async move {
                let result = backend.probe(&path).await.and_then(|info| validate(&path, info));
                (path, result)
            });
        }

        let mut infos = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = joined.map_err(|e| ProbeError::ToolFailed {
                path: "<probe task>".to_string(),
                reason: e.to_string(),
            })?;

            match result {
                Ok(info) => {
                    debug!(
                        "Probed {:?}: {:.3} fps, {:.3}s, audio: {}",
                        path, info.fps, info.duration, info.has_audio
                    );
                    infos.insert(path, info);
                }
                Err(e) => {
                    let affected: Vec<usize> = timeline
                        .clips()
                        .enumerate()
                        .filter(|(_, (_, source))| source.path == path)
                        .map(|(i, _)| i)
                        .collect();
                    warn!("Probe failed for {:?} (clips {:?}): {}", path, affected, e);
                    return Err(e.into());
                }
            }
        }

        Ok(infos)
    }
}

fn validate(path: &Path, info: SourceInfo) -> std::result::Result<SourceInfo, ProbeError> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if positive(info.fps) && positive(info.duration) {
        Ok(info)
    } else {
        Err(ProbeError::InvalidMeasurement {
            path: path.display().to_string(),
            fps: info.fps,
            duration: info.duration,
        })
    }
}
