use std::fmt;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{GeometryError, Stage};
use crate::media::StageOperation;
use crate::planning::resolver::{ResolvedClip, TimeWindow};
use crate::planning::summary::TimelineSummary;
use crate::timeline::{AudioDirective, Center, Resolution};

/// Lowest zoom level a zoom-out may reach (the full frame)
pub const MIN_ZOOM_LEVEL: f64 = 1.0;

/// Audio track attached to a clip before any speed change
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Generated silence covering the trimmed clip
    Silence { duration: f64 },

    /// External track, read from `offset` seconds onwards
    Track { path: PathBuf, offset: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Crop narrows over time
    In,

    /// Crop widens over time
    Out,
}

/// Zoom at a fixed center with a constant per-frame step
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomMotion {
    pub direction: ZoomDirection,

    /// Start width over end width; above 1 zooms in, below 1 zooms out
    pub factor: f64,

    pub start_level: f64,
    pub end_level: f64,

    /// Zoom change per output frame
    pub step: f64,

    /// Speed-compensated number of frames the motion spans
    pub frames: f64,

    /// Crop center, taken from the end endpoint
    pub center: Center,

    /// Frame size emitted by the zoom
    pub output: Resolution,

    pub fps: f64,
}

impl ZoomMotion {
    pub fn between(
        start: Resolution,
        end: Resolution,
        center: Center,
        frames: f64,
        fps: f64,
    ) -> Self {
        let factor = start.width as f64 / end.width as f64;
        let direction = if factor >= 1.0 { ZoomDirection::In } else { ZoomDirection::Out };
        let magnitude = factor.max(1.0 / factor);
        let (start_level, end_level) = match direction {
            ZoomDirection::In => (1.0, magnitude),
            ZoomDirection::Out => (magnitude, MIN_ZOOM_LEVEL),
        };

        Self {
            direction,
            factor,
            start_level,
            end_level,
            step: (magnitude - 1.0) / frames,
            frames,
            center,
            output: end,
            fps,
        }
    }

    /// Zoom ratio regardless of direction (always >= 1)
    pub fn magnitude(&self) -> f64 {
        self.factor.max(1.0 / self.factor)
    }

    /// Zoom level at the given output frame
    pub fn level_at(&self, frame: f64) -> f64 {
        match self.direction {
            ZoomDirection::In => (self.start_level + self.step * frame).min(self.end_level),
            ZoomDirection::Out => (self.start_level - self.step * frame)
                .max(self.end_level)
                .max(MIN_ZOOM_LEVEL),
        }
    }
}

/// Constant-scale translation of the crop center
#[derive(Debug, Clone, PartialEq)]
pub struct PanMotion {
    pub from: Center,
    pub to: Center,

    /// Crop size, unchanged for the whole clip
    pub resolution: Resolution,

    /// Seconds the pan takes, after speed compensation
    pub duration: f64,

    /// Pixels per second along each axis
    pub velocity: (f64, f64),

    pub fps: f64,
}

impl PanMotion {
    pub fn between(from: Center, to: Center, resolution: Resolution, duration: f64, fps: f64) -> Self {
        Self {
            from,
            to,
            resolution,
            duration,
            velocity: ((to.x - from.x) / duration, (to.y - from.y) / duration),
            fps,
        }
    }

    /// Pixels per output frame along each axis
    pub fn per_frame(&self) -> (f64, f64) {
        (self.velocity.0 / self.fps, self.velocity.1 / self.fps)
    }

    /// Crop center `t` seconds into the clip
    pub fn position_at(&self, t: f64) -> Center {
        let t = t.clamp(0.0, self.duration);
        Center::new(
            self.from.x + self.velocity.0 * t,
            self.from.y + self.velocity.1 * t,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationFlags {
    pub audio: bool,
    pub speed: bool,
    pub zoom: bool,
    pub pan: bool,
    pub scale: bool,
}

/// Every operation one clip needs, with the parameters each one takes
///
/// A parameter is present exactly when its flag is set.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationPlan {
    /// Position of the clip in the declared timeline
    pub clip: usize,

    pub source: PathBuf,
    pub flags: OperationFlags,
    pub trim: TimeWindow,
    pub audio: Option<AudioSource>,
    pub speed: Option<f64>,
    pub zoom: Option<ZoomMotion>,
    pub pan: Option<PanMotion>,
    pub scale: Option<Resolution>,
}

impl OperationPlan {
    /// The clip's stage chain in execution order; `None` stages pass through
    pub fn stages(&self) -> Vec<(Stage, Option<StageOperation>)> {
        let motion = self
            .zoom
            .clone()
            .map(StageOperation::Zoom)
            .or_else(|| self.pan.clone().map(StageOperation::Pan));

        vec![
            (Stage::Trim, Some(StageOperation::Trim(self.trim))),
            (Stage::Audio, self.audio.clone().map(StageOperation::AttachAudio)),
            (Stage::Speed, self.speed.map(|factor| StageOperation::ChangeSpeed { factor })),
            (Stage::Motion, motion),
            (Stage::Rescale, self.scale.map(|target| StageOperation::Rescale { target })),
        ]
    }
}

impl fmt::Display for OperationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clip {}: trim {:.3}-{:.3}s",
            self.clip, self.trim.start, self.trim.end
        )?;
        match &self.audio {
            Some(AudioSource::Silence { .. }) => write!(f, " | audio silence")?,
            Some(AudioSource::Track { path, offset }) => {
                write!(f, " | audio {} @{:.3}s", path.display(), offset)?
            }
            None => {}
        }
        if let Some(speed) = self.speed {
            write!(f, " | speed {}x", speed)?;
        }
        if let Some(zoom) = &self.zoom {
            let direction = match zoom.direction {
                ZoomDirection::In => "in",
                ZoomDirection::Out => "out",
            };
            write!(
                f,
                " | zoom {} x{:.3} at {} ({:+.5}/frame)",
                direction,
                zoom.magnitude(),
                zoom.center,
                zoom.step
            )?;
        }
        if let Some(pan) = &self.pan {
            write!(
                f,
                " | pan {} -> {} ({:.2}, {:.2}) px/s",
                pan.from, pan.to, pan.velocity.0, pan.velocity.1
            )?;
        }
        if let Some(target) = self.scale {
            write!(f, " | scale {}", target)?;
        }
        Ok(())
    }
}

/// Derives an [`OperationPlan`] for each resolved clip
pub struct TransformPlanner {
    summary: TimelineSummary,
}

impl TransformPlanner {
    pub fn new(summary: TimelineSummary) -> Self {
        Self { summary }
    }

    pub fn summary(&self) -> &TimelineSummary {
        &self.summary
    }

    /// Plan every clip, preserving timeline order
    pub fn plan_all(&self, clips: &[ResolvedClip]) -> Result<Vec<OperationPlan>, GeometryError> {
        clips.par_iter().map(|clip| self.plan(clip)).collect()
    }

    pub fn plan(&self, clip: &ResolvedClip) -> Result<OperationPlan, GeometryError> {
        let entry = &clip.entry;

        let framing = match (entry.start.framing, entry.end.framing) {
            (Some(start), Some(end)) => Some((start, end)),
            (None, None) => None,
            _ => return Err(GeometryError::MismatchedEndpoints { clip: clip.index }),
        };

        let frames = clip.frame_span() / entry.speed.factor();
        if frames <= 0.0 || clip.window.duration() <= 0.0 {
            return Err(GeometryError::EmptyWindow { clip: clip.index, frames });
        }

        let (zoom, pan) = match framing {
            Some((start, end)) => {
                if start.resolution.width == 0 || end.resolution.width == 0 {
                    return Err(GeometryError::ZeroWidth { clip: clip.index });
                }

                if start.resolution != end.resolution {
                    let zoom = ZoomMotion::between(
                        start.resolution,
                        end.resolution,
                        end.center,
                        frames,
                        clip.info.fps,
                    );
                    (Some(zoom), None)
                } else if start.center != end.center {
                    let pan = PanMotion::between(
                        start.center,
                        end.center,
                        end.resolution,
                        clip.effective_duration(),
                        clip.info.fps,
                    );
                    (None, Some(pan))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        let audio = match &entry.audio {
            AudioDirective::None if clip.info.has_audio => None,
            AudioDirective::None | AudioDirective::Silence => Some(AudioSource::Silence {
                duration: clip.window.duration(),
            }),
            AudioDirective::Replace(path) => {
                let own_track = clip.source.audio_path.as_ref() == Some(path);
                Some(AudioSource::Track {
                    path: path.clone(),
                    offset: if own_track { clip.window.start } else { 0.0 },
                })
            }
        };

        let speed = (!entry.speed.is_normal()).then(|| entry.speed.factor());

        let needs_scale = clip
            .output_resolution()
            .is_some_and(|r| r.width < self.summary.max_width());
        let scale = self.summary.target.filter(|_| needs_scale);

        let plan = OperationPlan {
            clip: clip.index,
            source: clip.source.path.clone(),
            flags: OperationFlags {
                audio: audio.is_some(),
                speed: speed.is_some(),
                zoom: zoom.is_some(),
                pan: pan.is_some(),
                scale: scale.is_some(),
            },
            trim: clip.window,
            audio,
            speed,
            zoom,
            pan,
            scale,
        };

        debug!("Planned {}", plan);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SourceInfo;
    use crate::planning::resolver::resolve_window;
    use crate::timeline::parse_timeline;

    const EPS: f64 = 1e-9;

    fn resolve(text: &str, info: SourceInfo) -> Vec<ResolvedClip> {
        let timeline = parse_timeline(text).unwrap();
        timeline
            .clips()
            .enumerate()
            .map(|(index, (entry, source))| {
                let (window, validity) = resolve_window(entry.start.frame, entry.end.frame, &info);
                ResolvedClip {
                    index,
                    entry: entry.clone(),
                    source: source.clone(),
                    info: info.clone(),
                    window,
                    validity,
                }
            })
            .collect()
    }

    fn full_hd(fps: f64, duration: f64) -> SourceInfo {
        SourceInfo {
            fps,
            duration,
            has_audio: true,
            resolution: Some(Resolution::new(1920, 1080)),
        }
    }

    fn plan_all(text: &str, info: SourceInfo) -> Result<Vec<OperationPlan>, GeometryError> {
        let clips = resolve(text, info);
        TransformPlanner::new(TimelineSummary::from_clips(&clips)).plan_all(&clips)
    }

    #[test]
    fn test_plain_clips_need_nothing_but_speed() {
        let plans = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [0]; [150]\ntimeline; a; 2; [0]; [150]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        assert_eq!(plans[0].flags, OperationFlags::default());
        assert_eq!(
            plans[1].flags,
            OperationFlags { speed: true, ..OperationFlags::default() }
        );
        assert_eq!(plans[1].speed, Some(2.0));
    }

    #[test]
    fn test_zoom_in_factor_and_step() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 960:540, 1920x1080]; [150, 960:540, 960x540]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let plan = &plans[0];
        assert!(plan.flags.zoom && !plan.flags.pan);
        let zoom = plan.zoom.as_ref().unwrap();
        assert_eq!(zoom.direction, ZoomDirection::In);
        assert_eq!(zoom.factor, 2.0);
        assert!((zoom.step - 1.0 / 150.0).abs() < EPS);
        assert_eq!(zoom.output, Resolution::new(960, 540));
        assert_eq!(zoom.level_at(0.0), 1.0);
        assert!((zoom.level_at(150.0) - 2.0).abs() < EPS);
        assert_eq!(zoom.level_at(400.0), 2.0);
    }

    #[test]
    fn test_zoom_step_is_speed_compensated() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 2; [0, 960:540, 1920x1080]; [150, 960:540, 960x540]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let zoom = plans[0].zoom.as_ref().unwrap();
        assert!((zoom.frames - 75.0).abs() < EPS);
        assert!((zoom.step - 1.0 / 75.0).abs() < EPS);
    }

    #[test]
    fn test_zoom_out_inverts_factor_and_never_drops_below_full_frame() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 100:100, 1920x1080]; [60, 100:100, 960x540]\n\
             timeline; a; 1; [0, 100:100, 960x540]; [60, 100:100, 1920x1080]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let zoom_in = plans[0].zoom.as_ref().unwrap();
        let zoom_out = plans[1].zoom.as_ref().unwrap();
        assert_eq!(zoom_out.direction, ZoomDirection::Out);
        assert_eq!(zoom_out.factor, 0.5);
        assert!((zoom_in.factor * zoom_out.factor - 1.0).abs() < EPS);
        assert_eq!(zoom_in.magnitude(), zoom_out.magnitude());
        assert!((zoom_in.step - zoom_out.step).abs() < EPS);

        assert_eq!(zoom_out.level_at(0.0), 2.0);
        assert!((zoom_out.level_at(30.0) - 1.5).abs() < EPS);
        for frame in [60.0, 61.0, 1_000.0] {
            assert_eq!(zoom_out.level_at(frame), MIN_ZOOM_LEVEL);
        }
    }

    #[test]
    fn test_pan_velocity_and_midpoint() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 100:100, 640x360]; [120, 500:100, 640x360]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let plan = &plans[0];
        assert!(plan.flags.pan && !plan.flags.zoom);
        let pan = plan.pan.as_ref().unwrap();
        assert_eq!(pan.velocity.1, 0.0);
        assert!(pan.velocity.0 > 0.0);
        assert!((pan.velocity.0 - 100.0).abs() < EPS);
        assert!((pan.per_frame().0 - 100.0 / 30.0).abs() < EPS);

        let mid = pan.position_at(pan.duration / 2.0);
        assert!((mid.x - 300.0).abs() < EPS);
        assert!((mid.y - 100.0).abs() < EPS);
        assert_eq!(pan.position_at(pan.duration * 3.0), Center::new(500.0, 100.0));
    }

    #[test]
    fn test_pan_duration_is_speed_compensated() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 2; [0, 100:100, 640x360]; [120, 500:100, 640x360]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let pan = plans[0].pan.as_ref().unwrap();
        assert!((pan.duration - 2.0).abs() < EPS);
        assert!((pan.velocity.0 - 200.0).abs() < EPS);
    }

    #[test]
    fn test_equal_framing_is_static() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 960:540, 1920x1080]; [30, 960:540, 1920x1080]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        assert!(!plans[0].flags.zoom && !plans[0].flags.pan);
    }

    #[test]
    fn test_scale_only_for_narrower_clips() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0]; [30]\n\
             timeline; a; 1; [0, 960:540, 1920x1080]; [30, 960:540, 960x540]\n\
             timeline; a; 1; [0, 960:540, 1920x800]; [30, 980:540, 1920x800]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        assert!(!plans[0].flags.scale);
        assert!(plans[1].flags.scale);
        assert_eq!(plans[1].scale, Some(Resolution::new(1920, 1080)));
        // Same width, different height: not narrower
        assert!(!plans[2].flags.scale);
    }

    #[test]
    fn test_static_framed_clip_beside_zoom_is_uniformly_sized() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 480:270, 960x540]; [30, 480:270, 960x540]\n\
             timeline; a; 1; [0, 960:540, 1920x1080]; [30, 960:540, 960x540]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        // The static clip is never cropped, so it stays at the source size
        assert_eq!(plans[0].flags, OperationFlags::default());
        assert!(plans[1].flags.zoom);
        assert_eq!(plans[1].scale, Some(Resolution::new(1920, 1080)));
    }

    #[test]
    fn test_geometry_failures() {
        let info = full_hd(30.0, 10.0);

        let mismatched = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [0, 1:1, 640x360]; [30]\n",
            info.clone(),
        );
        assert_eq!(mismatched, Err(GeometryError::MismatchedEndpoints { clip: 0 }));

        let zero = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [0, 1:1, 640x360]; [30, 1:1, 0x360]\n",
            info.clone(),
        );
        assert_eq!(zero, Err(GeometryError::ZeroWidth { clip: 0 }));

        let empty = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [30, 1:1, 640x360]; [30, 1:1, 320x180]\n",
            info,
        );
        assert!(matches!(empty, Err(GeometryError::EmptyWindow { clip: 0, .. })));
    }

    #[test]
    fn test_zero_length_bare_clips_are_rejected() {
        let equal_frames = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [300]; [300]\n",
            full_hd(30.0, 20.0),
        );
        assert!(matches!(equal_frames, Err(GeometryError::EmptyWindow { clip: 0, .. })));

        // Starts exactly at the end of a 10s source, so the clamp leaves nothing
        let at_end = plan_all(
            "video; a; 0; a.mp4\ntimeline; a; 1; [300]; [330]\n",
            full_hd(30.0, 10.0),
        );
        assert!(matches!(at_end, Err(GeometryError::EmptyWindow { clip: 0, .. })));
    }

    #[test]
    fn test_audio_directives() {
        let plans = plan_all(
            "video; a; 0; ./a.wav; a.mp4\n\
             timeline; a; 1; none; [0]; [30]\n\
             timeline; a; 1; silence; [30]; [60]\n\
             timeline; a; 1; ; [60]; [90]\n\
             timeline; a; 1; replace=music.wav; [60]; [90]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        assert_eq!(plans[0].audio, None);
        assert!(!plans[0].flags.audio);
        assert_eq!(plans[1].audio, Some(AudioSource::Silence { duration: 1.0 }));
        assert_eq!(
            plans[2].audio,
            Some(AudioSource::Track { path: PathBuf::from("./a.wav"), offset: 2.0 })
        );
        assert_eq!(
            plans[3].audio,
            Some(AudioSource::Track { path: PathBuf::from("music.wav"), offset: 0.0 })
        );
    }

    #[test]
    fn test_silent_source_gets_silence() {
        let mut info = full_hd(30.0, 10.0);
        info.has_audio = false;
        let plans = plan_all("video; a; 0; a.mp4\ntimeline; a; 1; none; [0]; [30]\n", info).unwrap();

        assert!(plans[0].flags.audio);
        assert_eq!(plans[0].audio, Some(AudioSource::Silence { duration: 1.0 }));
    }

    #[test]
    fn test_stage_chain_order() {
        let plans = plan_all(
            "video; a; 0; a.mp4\n\
             timeline; a; 2; silence; [0, 960:540, 1920x1080]; [150, 960:540, 960x540]\n\
             timeline; a; 1; [0]; [30]\n",
            full_hd(30.0, 10.0),
        )
        .unwrap();

        let stages = plans[0].stages();
        let order: Vec<Stage> = stages.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(order, Stage::ORDER.to_vec());
        let kinds: Vec<&str> = stages
            .iter()
            .filter_map(|(_, op)| op.as_ref().map(StageOperation::kind))
            .collect();
        assert_eq!(kinds, vec!["trim", "audio", "speed", "zoom", "rescale"]);
    }
}
