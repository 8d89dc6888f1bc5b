//! # Timeline Model
//!
//! Parsed sources and timeline entries, kept in declaration order, plus the
//! line-oriented text format they are read from.

pub mod parser;
pub mod types;

pub use parser::{load_timeline, parse_timeline};
pub use types::{
    AudioDirective, Center, Endpoint, Framing, Resolution, Source, Speed, Timeline,
    TimelineEntry,
};
