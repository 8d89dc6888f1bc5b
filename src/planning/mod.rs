//! # Timeline Planning
//!
//! Turns parsed timeline entries into concrete per-clip operation plans:
//!
//! 1. [`FrameTimeResolver`] probes each used source once and converts frame
//!    markers into time windows, clamping overruns and dropping clips that
//!    start past the end of their source.
//! 2. [`TimelineSummary`] reduces the playable clips to timeline-wide facts
//!    such as the common output resolution.
//! 3. [`TransformPlanner`] decides which operations each clip needs and
//!    derives the zoom/pan motion parameters.

pub mod planner;
pub mod resolver;
pub mod summary;

pub use planner::{
    AudioSource, OperationFlags, OperationPlan, PanMotion, TransformPlanner, ZoomDirection,
    ZoomMotion, MIN_ZOOM_LEVEL,
};
pub use resolver::{
    resolve_window, FrameTimeResolver, ResolvedClip, ResolvedTimeline, TimeWindow, Validity,
};
pub use summary::TimelineSummary;
