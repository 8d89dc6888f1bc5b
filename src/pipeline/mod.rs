//! # Clip Pipeline
//!
//! Executes operation plans against the media backend. Each clip runs its
//! stages strictly in order (trim, audio, speed, motion, rescale) while
//! separate clips run concurrently up to a configured limit. All
//! intermediate artifacts live in a [`Workspace`] that is removed on every
//! exit path.

pub mod concat;
pub mod sequencer;
pub mod workspace;

pub use concat::Concatenator;
pub use sequencer::{cancelled, ClipArtifact, PipelineSequencer};
pub use workspace::Workspace;
