//! # Timeline-Stitcher
//!
//! Compile a declarative timeline of video clips into one stitched output.
//!
//! A timeline lists named sources and the entries cut from them: frame
//! markers, a playback speed, an audio directive and optional pan/zoom
//! endpoints. The library resolves frame markers against each source's real
//! frame rate, plans the operations every clip needs and runs them through an
//! external media tool before joining the clips in order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timeline_stitcher::{
//!     composition::StitchEngine,
//!     config::Config,
//!     media::FfmpegBackend,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backend = Arc::new(FfmpegBackend::new(config.tools.clone(), config.encoding.clone()));
//!
//! let engine = StitchEngine::new(config, backend);
//! engine.compose("timeline.txt", "Data/output.mp4").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Timeline Format
//!
//! ```text
//! # name; reference frame; [audio]; media
//! video; intro; 0; ./audio/intro.wav; ./clips/intro.mp4
//!
//! # source; speed; [audio]; start; end
//! timeline; intro; 1; ; [0]; [150]
//! timeline; intro; 2; silence; [0, 960:540, 1920x1080]; [150, 960:540, 960x540]
//! ```
//!
//! ## Architecture
//!
//! - [`timeline`] - Timeline model and text format
//! - [`planning`] - Frame-time resolution and per-clip operation planning
//! - [`media`] - Probe/transform/concat backend (ffmpeg)
//! - [`pipeline`] - Per-clip stage execution, concatenation and workspace cleanup
//! - [`composition`] - The engine driving a whole run
//! - [`config`] - Configuration management

pub mod composition;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod planning;
pub mod timeline;

// Re-export commonly used types for convenience
pub use crate::{
    composition::StitchEngine,
    config::Config,
    error::{Result, StitchError},
    media::{FfmpegBackend, MediaBackend},
    timeline::Timeline,
};
