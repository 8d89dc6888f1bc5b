//! # Stitch Engine
//!
//! The engine ties the timeline model, planning layer and clip pipeline
//! together and owns the workspace for the duration of a run.

pub mod engine;

// Re-exports for convenience
pub use engine::{CompiledTimeline, StitchEngine};
