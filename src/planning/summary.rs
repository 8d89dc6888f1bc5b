use crate::planning::resolver::ResolvedClip;
use crate::timeline::Resolution;

/// Facts about the whole timeline, derived once before planning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSummary {
    /// Number of playable clips
    pub clip_count: usize,

    /// Widest output resolution across all clips (ties go to the taller one)
    pub target: Option<Resolution>,

    /// Expected length of the stitched output in seconds
    pub total_duration: f64,
}

impl TimelineSummary {
    pub fn from_clips(clips: &[ResolvedClip]) -> Self {
        let target = clips
            .iter()
            .filter_map(ResolvedClip::output_resolution)
            .max_by_key(|r| (r.width, r.height));

        Self {
            clip_count: clips.len(),
            target,
            total_duration: clips.iter().map(ResolvedClip::effective_duration).sum(),
        }
    }

    pub fn max_width(&self) -> u32 {
        self.target.map(|r| r.width).unwrap_or(0)
    }
}
