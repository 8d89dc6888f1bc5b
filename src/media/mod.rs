//! Access to the external media tools: probing sources, running one
//! transformation per stage and joining the final clips.

pub mod backend;
pub mod ffmpeg;

pub use backend::{MediaBackend, SourceInfo, StageOperation};
pub use ffmpeg::FfmpegBackend;
